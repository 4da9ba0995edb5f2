//! Durable subscription store.
//!
//! A single JSON document keyed by device identifier, rewritten wholesale on
//! every mutation through a temporary file renamed over the target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Persisted state of one device subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSubscription {
    pub active: bool,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub stop_date: Option<DateTime<Utc>>,
}

/// File-backed store of device subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    path: PathBuf,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored subscription. A missing file is an empty store.
    pub async fn load(&self) -> Result<BTreeMap<String, StoredSubscription>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No subscription store yet, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(BridgeError::storage(&self.path, e)),
        };

        serde_json::from_slice(&content).map_err(|e| BridgeError::storage(&self.path, e))
    }

    /// Replace the stored subscriptions with `entries`.
    pub async fn save(&self, entries: &BTreeMap<String, StoredSubscription>) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(entries).map_err(|e| BridgeError::storage(&self.path, e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| BridgeError::storage(&self.path, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| BridgeError::storage(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "Subscription store written");
        Ok(())
    }
}
