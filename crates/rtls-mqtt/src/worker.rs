use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use rtls_domain::TagEventService;

use crate::subscriber::run_mqtt_subscriber;

/// Ingest worker configuration.
#[derive(Debug, Clone)]
pub struct IngestWorkerConfig {
    pub broker_url: String,
    pub client_id: String,
    /// Topic delivering tag event batches.
    pub topic: String,
    pub max_retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// Upper bound on events reconciling concurrently.
    pub max_in_flight_events: usize,
}

impl IngestWorkerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// MQTT ingestion worker: subscribes to the event topic and feeds decoded
/// batches into the reconciliation service.
pub struct IngestWorker {
    config: IngestWorkerConfig,
    service: Arc<TagEventService>,
}

impl IngestWorker {
    pub fn new(config: IngestWorkerConfig, service: Arc<TagEventService>) -> Self {
        Self { config, service }
    }

    /// Runs until cancelled or until the reconnect attempts are exhausted.
    pub async fn run(self, shutdown_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            broker_url = %self.config.broker_url,
            topic = %self.config.topic,
            "starting ingest worker"
        );
        run_mqtt_subscriber(self.config, shutdown_token, self.service).await;
        Ok(())
    }
}
