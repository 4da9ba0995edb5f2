//! Per-device subscription registry.
//!
//! The registry decides which broker intents a start/stop command produces and
//! applies broker confirmations to its entries. Entries only change on a
//! confirmation, and every change is written through to the durable store.
//!
//! Broker intents for a device are executed in issue order, so confirmations
//! arrive in that order too. A device can therefore have a stop in flight
//! while a later start is queued behind it; the registry tracks only the most
//! recent intent per device to decide whether a new command is redundant.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::{StoredSubscription, SubscriptionStore};

/// Live-data forwarding state of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSubscription {
    pub device_id: String,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl MonitorSubscription {
    fn from_stored(device_id: String, stored: StoredSubscription) -> Self {
        Self {
            device_id,
            active: stored.active,
            started_at: stored.start_date,
            stopped_at: stored.stop_date,
        }
    }

    fn to_stored(&self) -> StoredSubscription {
        StoredSubscription {
            active: self.active,
            start_date: self.started_at,
            stop_date: self.stopped_at,
        }
    }
}

/// Broker work requested by a start/stop command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionIntent {
    /// Subscribe the device's data and wave topics.
    Subscribe,
    /// Unsubscribe the device's data and wave topics.
    Unsubscribe,
    /// Nothing to do at the broker.
    Unchanged,
}

/// Broker operation awaiting confirmation for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Subscribe,
    Unsubscribe,
}

/// Registry of device subscriptions backed by a [`SubscriptionStore`].
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<String, MonitorSubscription>,
    pending: HashMap<String, PendingOp>,
    store: SubscriptionStore,
}

impl SubscriptionRegistry {
    /// Open the registry, merging the stored subscriptions into memory.
    pub async fn open(store: SubscriptionStore) -> Result<Self> {
        let stored = store.load().await?;

        let entries: BTreeMap<_, _> = stored
            .into_iter()
            .map(|(id, s)| (id.clone(), MonitorSubscription::from_stored(id, s)))
            .collect();

        tracing::info!(
            path = %store.path().display(),
            devices = entries.len(),
            active = entries.values().filter(|e| e.active).count(),
            "Subscription registry loaded"
        );

        Ok(Self {
            entries,
            pending: HashMap::new(),
            store,
        })
    }

    /// Handle a start command for a device.
    pub fn start(&mut self, device_id: &str) -> SubscriptionIntent {
        match self.pending.get(device_id) {
            Some(PendingOp::Subscribe) => return SubscriptionIntent::Unchanged,
            Some(PendingOp::Unsubscribe) => {}
            None if self.is_active(device_id) => return SubscriptionIntent::Unchanged,
            None => {}
        }

        self.pending
            .insert(device_id.to_string(), PendingOp::Subscribe);
        SubscriptionIntent::Subscribe
    }

    /// Handle a stop command for a device.
    pub fn stop(&mut self, device_id: &str) -> SubscriptionIntent {
        match self.pending.get(device_id) {
            Some(PendingOp::Unsubscribe) => return SubscriptionIntent::Unchanged,
            Some(PendingOp::Subscribe) => {}
            None if !self.is_active(device_id) => return SubscriptionIntent::Unchanged,
            None => {}
        }

        self.pending
            .insert(device_id.to_string(), PendingOp::Unsubscribe);
        SubscriptionIntent::Unsubscribe
    }

    /// Apply a successful subscribe confirmation.
    ///
    /// On a storage failure the in-memory entry is restored and the error
    /// returned; the mutation did not happen.
    pub async fn confirm_subscribed(&mut self, device_id: &str) -> Result<()> {
        self.settle(device_id, PendingOp::Subscribe);

        let entry = MonitorSubscription {
            device_id: device_id.to_string(),
            active: true,
            started_at: Utc::now(),
            stopped_at: None,
        };
        let previous = self.entries.insert(device_id.to_string(), entry);

        self.persist_or_restore(device_id, previous).await
    }

    /// Apply a successful unsubscribe confirmation.
    pub async fn confirm_unsubscribed(&mut self, device_id: &str) -> Result<()> {
        self.settle(device_id, PendingOp::Unsubscribe);

        let Some(entry) = self.entries.get_mut(device_id) else {
            return Ok(());
        };
        let previous = entry.clone();
        entry.active = false;
        entry.stopped_at = Some(Utc::now());

        self.persist_or_restore(device_id, Some(previous)).await
    }

    /// Record a failed subscribe; the previous state stays in place.
    pub fn subscribe_failed(&mut self, device_id: &str) {
        self.settle(device_id, PendingOp::Subscribe);
    }

    /// Record a failed unsubscribe; the device stays active.
    pub fn unsubscribe_failed(&mut self, device_id: &str) {
        self.settle(device_id, PendingOp::Unsubscribe);
    }

    /// Devices whose live data is currently forwarded.
    pub fn active_devices(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.active)
            .map(|e| e.device_id.clone())
            .collect()
    }

    pub fn get(&self, device_id: &str) -> Option<&MonitorSubscription> {
        self.entries.get(device_id)
    }

    pub fn is_active(&self, device_id: &str) -> bool {
        self.entries.get(device_id).is_some_and(|e| e.active)
    }

    /// Whether a subscribe or unsubscribe is awaiting confirmation.
    pub fn is_pending(&self, device_id: &str) -> bool {
        self.pending.contains_key(device_id)
    }

    /// The most recent unconfirmed operation for a device.
    pub fn pending_op(&self, device_id: &str) -> Option<PendingOp> {
        self.pending.get(device_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn settle(&mut self, device_id: &str, op: PendingOp) {
        if self.pending.get(device_id) == Some(&op) {
            self.pending.remove(device_id);
        }
    }

    async fn persist_or_restore(
        &mut self,
        device_id: &str,
        previous: Option<MonitorSubscription>,
    ) -> Result<()> {
        let snapshot: BTreeMap<String, StoredSubscription> = self
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.to_stored()))
            .collect();

        if let Err(e) = self.store.save(&snapshot).await {
            match previous {
                Some(entry) => {
                    self.entries.insert(device_id.to_string(), entry);
                }
                None => {
                    self.entries.remove(device_id);
                }
            }
            return Err(e);
        }

        Ok(())
    }
}
