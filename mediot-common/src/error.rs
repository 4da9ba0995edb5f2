use thiserror::Error;

/// Common error type for MedIoT components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using MedIoT's Error.
pub type Result<T> = std::result::Result<T, Error>;
