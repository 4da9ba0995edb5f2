//! Error types for the bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Zenoh connection error.
    #[error("Zenoh connection error: {0}")]
    ZenohConnection(String),

    /// Zenoh session error.
    #[error("Zenoh session error: {0}")]
    ZenohSession(String),

    /// Subscription could not be declared.
    #[error("Failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },

    /// Subscription could not be undeclared.
    #[error("Failed to unsubscribe from {topic}: {message}")]
    Unsubscribe { topic: String, message: String },

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Durable subscription store could not be read or written.
    #[error("Subscription store failure at {path}: {message}")]
    Storage { path: String, message: String },

    /// Imaging store retrieval failed.
    #[error("Imaging retrieval failed for {path}: {message}")]
    Imaging { path: String, message: String },

    /// Malformed inbound message.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl ToString) -> Self {
        Self::Parse(msg.to_string())
    }

    /// Create a storage error for the given store path.
    pub fn storage(path: &std::path::Path, msg: impl ToString) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            message: msg.to_string(),
        }
    }

    /// Whether this error comes from the durable subscription store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

impl From<zenoh::Error> for BridgeError {
    fn from(err: zenoh::Error) -> Self {
        Self::ZenohSession(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<mediot_common::Error> for BridgeError {
    fn from(err: mediot_common::Error) -> Self {
        match err {
            mediot_common::Error::Config(msg) => Self::Config(msg),
            mediot_common::Error::Zenoh(e) => Self::ZenohSession(e.to_string()),
            mediot_common::Error::Io(e) => Self::Io(e),
            other => Self::Parse(other.to_string()),
        }
    }
}
