//! MedIoT Common Library
//!
//! Shared types and utilities for the MedIoT bridge:
//!
//! - [`topic`] - Broker topic builders and parsers (`TopicScheme`, `ParsedTopic`)
//! - [`vitals`] - Vital samples and waveform frames
//! - [`imaging`] - Imaging notifications and retrieved images
//! - [`protocol`] - Streaming client protocol (`ClientMessage`, `ServerEvent`)
//! - [`config`] - Zenoh and logging configuration sections
//! - [`session`] - Broker (Zenoh) session management
//! - [`error`] - Error types

mod base64_bytes;
pub mod config;
pub mod error;
pub mod imaging;
pub mod protocol;
pub mod session;
pub mod topic;
pub mod vitals;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, ZenohMode};
pub use error::{Error, Result};
pub use imaging::{ImagingRequest, ImagingResult};
pub use protocol::{
    AckCommand, ClientMessage, ServerEvent, StartMonitorCommand, VitalBatchMessage,
    WELCOME_MESSAGE,
};
pub use session::connect;
pub use topic::{DeviceChannel, ParsedTopic, TopicScheme, validate_device_id};
pub use vitals::{VitalReadings, VitalSample, WaveformFrame};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
