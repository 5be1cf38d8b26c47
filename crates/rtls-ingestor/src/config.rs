use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use rtls_domain::DerivedTimestampPolicy;
use rtls_mqtt::IngestWorkerConfig;
use rtls_postgres::PostgresConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// MQTT broker URL
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    /// MQTT client identifier
    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Topic delivering tag event batches
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    /// Max MQTT reconnect attempts before the worker gives up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Delay between MQTT reconnect attempts in seconds
    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Upper bound on events reconciling concurrently
    #[serde(default = "default_max_in_flight_events")]
    pub max_in_flight_events: usize,

    /// Derived-timestamp rule set ("per-flag" or "in-line")
    #[serde(default)]
    pub timestamp_policy: DerivedTimestampPolicy,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Run the one-time catalog seeder before starting ingestion
    #[serde(default = "default_seed_enabled")]
    pub seed_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "rtls-ingestor".to_string()
}

fn default_mqtt_topic() -> String {
    "rtlsUseCase/IpLHD/events".to_string()
}

fn default_mqtt_max_retry_attempts() -> u32 {
    5
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_max_in_flight_events() -> usize {
    64
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "rtls".to_string()
}

fn default_postgres_username() -> String {
    "rtls".to_string()
}

fn default_postgres_password() -> String {
    "rtls".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_seed_enabled() -> bool {
    false
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RTLS"))
            .build()?
            .try_deserialize()
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn ingest(&self) -> IngestWorkerConfig {
        IngestWorkerConfig {
            broker_url: self.mqtt_broker_url.clone(),
            client_id: self.mqtt_client_id.clone(),
            topic: self.mqtt_topic.clone(),
            max_retry_attempts: self.mqtt_max_retry_attempts,
            retry_delay_secs: self.mqtt_retry_delay_secs,
            max_in_flight_events: self.max_in_flight_events,
        }
    }
}
