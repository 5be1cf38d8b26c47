mod client;
mod config;
mod device_repository;
mod models;
mod seed;
mod telemetry_repository;

pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use device_repository::PostgresDeviceRepository;
pub use models::DeviceRow;
pub use seed::CatalogSeeder;
pub use telemetry_repository::PostgresTelemetryRepository;
