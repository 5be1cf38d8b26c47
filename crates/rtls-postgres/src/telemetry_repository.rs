use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;

use rtls_domain::{TelemetryRepository, TelemetryWrite};

use crate::client::PostgresClient;

/// PostgreSQL implementation of the TelemetryRepository trait.
///
/// Upserts replace the whole stored value for a (device, name) pair; the
/// consistency of concurrent writers is delegated to the store's atomic
/// ON CONFLICT update, not to any in-process lock.
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    async fn upsert_telemetry(&self, device_id: i64, write: TelemetryWrite) -> anyhow::Result<()> {
        let conn = self.client.get_connection().await?;
        let value = write.value.to_json();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO last_telemetries (device_id, name, value, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (device_id, name) DO UPDATE
             SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
            &[&device_id, &write.name, &value, &now],
        )
        .await
        .with_context(|| format!("failed to upsert telemetry {}", write.name))?;

        Ok(())
    }
}
