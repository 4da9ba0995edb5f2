//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use zenoh::Session;

use crate::error::{BridgeError, Result};

/// Bridge status information, published on the status topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running" or "offline").
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_state(bridge, version, "running")
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_state(bridge, version, "offline")
    }

    fn with_state(
        bridge: impl Into<String>,
        version: impl Into<String>,
        status: &str,
    ) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: status.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status as JSON to `topic`.
    pub async fn publish(&self, session: &Session, topic: &str) -> Result<()> {
        let payload = serde_json::to_vec(self)?;
        session
            .put(topic, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = BridgeStatus::running("mediot-bridge", "0.1.0");
        assert_eq!(status.bridge, "mediot-bridge");
        assert_eq!(status.status, "running");
    }

    #[test]
    fn test_status_offline() {
        assert_eq!(BridgeStatus::offline("mediot-bridge", "0.1.0").status, "offline");
    }

    #[test]
    fn test_status_serialization() {
        let status = BridgeStatus::running("mediot-bridge", "1.0.0")
            .with_metadata(serde_json::json!({ "active_devices": 2, "listen": "0.0.0.0:5500" }));

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"bridge\":\"mediot-bridge\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"active_devices\":2"));
    }
}
