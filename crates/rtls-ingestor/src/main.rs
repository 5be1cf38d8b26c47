mod config;
mod telemetry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use rtls_domain::TagEventService;
use rtls_mqtt::IngestWorker;
use rtls_postgres::{
    CatalogSeeder, PostgresClient, PostgresDeviceRepository, PostgresTelemetryRepository,
};

use crate::config::ServiceConfig;
use crate::telemetry::init_tracing;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    info!(
        broker_url = %config.mqtt_broker_url,
        topic = %config.mqtt_topic,
        policy = ?config.timestamp_policy,
        "starting rtls-ingestor"
    );
    debug!("configuration: {:?}", config);

    let client = match PostgresClient::new(&config.postgres()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create PostgreSQL client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = client.ping().await {
        error!("PostgreSQL is unreachable: {}", e);
        std::process::exit(1);
    }

    if config.seed_enabled {
        info!("running catalog seeder");
        if let Err(e) = CatalogSeeder::new(client.clone()).run().await {
            error!("Catalog seeding failed: {}", e);
            std::process::exit(1);
        }
    }

    let device_repository = Arc::new(PostgresDeviceRepository::new(client.clone()));
    let telemetry_repository = Arc::new(PostgresTelemetryRepository::new(client));
    let service = Arc::new(TagEventService::new(
        device_repository,
        telemetry_repository,
        config.timestamp_policy,
    ));

    let worker = IngestWorker::new(config.ingest(), service);

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal_token.cancel();
            }
            Err(err) => {
                error!("Error setting up signal handler: {}", err);
            }
        }
    });

    if let Err(e) = worker.run(shutdown_token).await {
        error!("Ingest worker failed: {}", e);
        std::process::exit(1);
    }

    info!("rtls-ingestor stopped");
}
