use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use rtls_domain::{
    Device, DeviceRepository, ResolvedDevice, TelemetryWrite, UpsertDeviceInput,
    DEFAULT_PROFILE_NAME,
};

use crate::client::PostgresClient;
use crate::models::DeviceRow;

/// PostgreSQL implementation of the DeviceRepository trait.
///
/// Devices are keyed by their unique external serial; creation attaches the
/// default tag profile and seeds the initial attribute rows. A concurrent
/// create for the same serial loses the unique-constraint race and resolves
/// to the surviving row instead of failing the event.
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn get_by_serial(&self, serial: &str) -> anyhow::Result<Option<Device>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                "SELECT id, serial, name, device_profile_id, created_at, updated_at
                 FROM devices
                 WHERE serial = $1",
                &[&serial],
            )
            .await
            .context("failed to query device by serial")?;

        Ok(row.map(|row| {
            let device_row = DeviceRow {
                id: row.get(0),
                serial: row.get(1),
                name: row.get(2),
                device_profile_id: row.get(3),
                created_at: row.get(4),
                updated_at: row.get(5),
            };
            device_row.into()
        }))
    }

    /// Resolves the id of the default tag profile, creating the profile and
    /// its device type on first use. Insert-if-absent then select keeps
    /// concurrent first use race-free under the unique name keys.
    async fn ensure_default_profile(&self) -> anyhow::Result<i64> {
        let conn = self.client.get_connection().await?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO device_types (name, created_at, updated_at)
             VALUES ($1, $2, $2)
             ON CONFLICT (name) DO NOTHING",
            &[&DEFAULT_PROFILE_NAME, &now],
        )
        .await
        .context("failed to ensure default device type")?;

        let type_id: i64 = conn
            .query_one(
                "SELECT id FROM device_types WHERE name = $1",
                &[&DEFAULT_PROFILE_NAME],
            )
            .await
            .context("failed to fetch default device type")?
            .get(0);

        conn.execute(
            "INSERT INTO device_profiles (name, description, device_type_id, created_at, updated_at)
             VALUES ($1, $1, $2, $3, $3)
             ON CONFLICT (name) DO NOTHING",
            &[&DEFAULT_PROFILE_NAME, &type_id, &now],
        )
        .await
        .context("failed to ensure default device profile")?;

        let profile_id: i64 = conn
            .query_one(
                "SELECT id FROM device_profiles WHERE name = $1",
                &[&DEFAULT_PROFILE_NAME],
            )
            .await
            .context("failed to fetch default device profile")?
            .get(0);

        Ok(profile_id)
    }

    async fn seed_attributes(&self, device_id: i64, seed: &[TelemetryWrite]) -> anyhow::Result<()> {
        let conn = self.client.get_connection().await?;
        let now = Utc::now();

        for write in seed {
            let value = write.value.to_json();
            conn.execute(
                "INSERT INTO last_telemetries (device_id, name, value, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (device_id, name) DO NOTHING",
                &[&device_id, &write.name, &value, &now],
            )
            .await
            .with_context(|| format!("failed to seed attribute {}", write.name))?;
        }

        Ok(())
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    async fn upsert_device(&self, input: UpsertDeviceInput) -> anyhow::Result<ResolvedDevice> {
        if let Some(device) = self.get_by_serial(&input.serial).await? {
            return Ok(ResolvedDevice {
                device,
                created: false,
            });
        }

        let profile_id = self.ensure_default_profile().await?;
        let conn = self.client.get_connection().await?;
        let now = Utc::now();

        // New tags are named after their serial.
        let result = conn
            .query_one(
                "INSERT INTO devices (serial, name, device_profile_id, created_at, updated_at)
                 VALUES ($1, $1, $2, $3, $3)
                 RETURNING id",
                &[&input.serial, &profile_id, &now],
            )
            .await;

        match result {
            Ok(row) => {
                let device = Device {
                    id: row.get(0),
                    serial: input.serial.clone(),
                    name: input.serial.clone(),
                };
                self.seed_attributes(device.id, &input.seed).await?;
                debug!(device_id = device.id, serial = %device.serial, "created device");
                Ok(ResolvedDevice {
                    device,
                    created: true,
                })
            }
            Err(e) => {
                // PostgreSQL error code 23505 is unique_violation: another
                // event won the create race for this serial.
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        let device = self.get_by_serial(&input.serial).await?.ok_or_else(|| {
                            anyhow::anyhow!("device {} missing after create race", input.serial)
                        })?;
                        return Ok(ResolvedDevice {
                            device,
                            created: false,
                        });
                    }
                }
                Err(anyhow::Error::new(e).context("failed to insert device"))
            }
        }
    }
}
