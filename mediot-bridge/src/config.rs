//! Configuration traits and the bridge configuration file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use mediot_common::topic::{DEFAULT_IMAGING_TOPIC, DEFAULT_PREFIX};
use mediot_common::{LoggingConfig, TopicScheme, ZenohConfig};

use crate::error::{BridgeError, Result};

/// Trait for bridge configuration types.
///
/// Provides loading, validation, and access to the common config fields.
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the Zenoh configuration.
    fn zenoh(&self) -> &ZenohConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string and validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediotConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Broker topic layout.
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Streaming client endpoint.
    #[serde(default)]
    pub http: HttpConfig,

    /// Durable subscription store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Imaging store credentials.
    #[serde(default)]
    pub imaging: ImagingConfig,

    /// Broker link supervision.
    #[serde(default)]
    pub link: LinkConfig,
}

/// Broker topic layout.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    /// Prefix of device topics (default: "mediot").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Imaging notification topic (default: "dicom/data").
    #[serde(default = "default_imaging_topic")]
    pub imaging: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_imaging_topic() -> String {
    DEFAULT_IMAGING_TOPIC.to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            imaging: default_imaging_topic(),
        }
    }
}

impl TopicsConfig {
    pub fn scheme(&self) -> TopicScheme {
        TopicScheme::new(&self.prefix, &self.imaging)
    }
}

/// Streaming client endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:5500").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// WebSocket path (default: "/ws").
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Origins allowed to connect (empty = any).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_listen() -> String {
    "0.0.0.0:5500".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_ws_path(),
            allowed_origins: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            BridgeError::validation(format!("Invalid listen address '{}': {}", self.listen, e))
        })
    }
}

/// Durable subscription store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the subscription file (default: "subscriptions.json").
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("subscriptions.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Imaging store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagingConfig {
    /// Base URL that imaging paths are resolved against.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Broker link supervision settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// How often the broker link state is sampled (milliseconds).
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,
}

fn default_check_interval() -> u64 {
    1000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval(),
        }
    }
}

impl LinkConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl BridgeConfig for MediotConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        if self.topics.prefix.is_empty() || self.topics.prefix.contains(['*', '$']) {
            return Err(BridgeError::validation(format!(
                "topics.prefix '{}' is not a valid topic prefix",
                self.topics.prefix
            )));
        }
        if self.topics.imaging.is_empty() {
            return Err(BridgeError::validation("topics.imaging must not be empty"));
        }
        self.http.listen_addr()?;
        if !self.http.path.starts_with('/') {
            return Err(BridgeError::validation(format!(
                "http.path '{}' must start with '/'",
                self.http.path
            )));
        }
        if self.imaging.base_url.is_empty() {
            return Err(BridgeError::validation("imaging.base_url must be set"));
        }
        if self.link.check_interval_ms == 0 {
            return Err(BridgeError::validation("link.check_interval_ms must be > 0"));
        }
        Ok(())
    }
}
