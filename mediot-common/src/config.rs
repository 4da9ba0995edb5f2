//! Configuration sections shared by every MedIoT component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of the local Zenoh session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZenohMode {
    /// Connects through a router; the broker link is up only while one is reachable.
    #[default]
    Client,
    Peer,
    Router,
}

impl ZenohMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZenohMode::Client => "client",
            ZenohMode::Peer => "peer",
            ZenohMode::Router => "router",
        }
    }
}

impl fmt::Display for ZenohMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker link settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    #[serde(default)]
    pub mode: ZenohMode,

    /// Endpoints to connect to, e.g. `tcp/broker:7447`.
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (peer and router modes).
    #[serde(default)]
    pub listen: Vec<String>,
}

impl ZenohConfig {
    pub fn is_client(&self) -> bool {
        self.mode == ZenohMode::Client
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `mediot_bridge=debug,zenoh=warn`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sections {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_sections_from_json5() {
        let text = r#"
        {
            zenoh: { mode: "peer", listen: ["tcp/0.0.0.0:7447"] },
            logging: { level: "mediot_bridge=debug", format: "json" },
        }
        "#;

        let sections: Sections = json5::from_str(text).unwrap();

        assert_eq!(sections.zenoh.mode, ZenohMode::Peer);
        assert!(!sections.zenoh.is_client());
        assert_eq!(sections.zenoh.listen, vec!["tcp/0.0.0.0:7447"]);
        assert_eq!(sections.logging.level, "mediot_bridge=debug");
        assert_eq!(sections.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_defaults() {
        let sections: Sections = json5::from_str("{}").unwrap();

        assert!(sections.zenoh.is_client());
        assert!(sections.zenoh.connect.is_empty());
        assert_eq!(sections.logging.level, "info");
        assert_eq!(sections.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = json5::from_str::<Sections>(r#"{ zenoh: { mode: "satellite" } }"#);
        assert!(result.is_err());
    }
}
