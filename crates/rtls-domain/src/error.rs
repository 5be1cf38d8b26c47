use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid tag event: {0}")]
    InvalidEvent(String),

    #[error("device resolution failed for tag {serial}: {source}")]
    ResolutionError {
        serial: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("telemetry write failed for attribute {name} on device {device_id}: {source}")]
    WriteError {
        device_id: i64,
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
