//! Backlog of emitted batches awaiting client acknowledgment.

use std::collections::BTreeMap;

use uuid::Uuid;

/// One unacknowledged delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct BacklogEntry<P> {
    pub id: Uuid,
    pub payload: P,
}

/// Per-device backlog of unacknowledged payloads.
///
/// Entries are kept until explicitly acknowledged; there is no expiry.
#[derive(Debug)]
pub struct DeliveryTracker<P> {
    backlogs: BTreeMap<String, Vec<BacklogEntry<P>>>,
}

impl<P> Default for DeliveryTracker<P> {
    fn default() -> Self {
        Self {
            backlogs: BTreeMap::new(),
        }
    }
}

impl<P: Clone> DeliveryTracker<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload to the device's backlog and return its identifier.
    pub fn record(&mut self, device_id: &str, payload: P) -> Uuid {
        let id = Uuid::new_v4();
        self.backlogs
            .entry(device_id.to_string())
            .or_default()
            .push(BacklogEntry { id, payload });
        id
    }

    /// Remove the entry with `id`. Returns whether an entry was removed.
    ///
    /// Unknown identifiers are ignored: clients may ack twice or ack ids
    /// from before a reconnect.
    pub fn ack(&mut self, device_id: &str, id: Uuid) -> bool {
        let Some(backlog) = self.backlogs.get_mut(device_id) else {
            return false;
        };
        let Some(pos) = backlog.iter().position(|e| e.id == id) else {
            return false;
        };
        backlog.remove(pos);
        if backlog.is_empty() {
            self.backlogs.remove(device_id);
        }
        true
    }

    /// Every unacknowledged entry of a device, oldest first.
    pub fn replay(&self, device_id: &str) -> Vec<BacklogEntry<P>> {
        self.backlogs.get(device_id).cloned().unwrap_or_default()
    }

    /// Every unacknowledged entry, grouped by device; oldest first per device.
    pub fn replay_all(&self) -> Vec<(String, BacklogEntry<P>)> {
        self.backlogs
            .iter()
            .flat_map(|(device, entries)| entries.iter().map(|e| (device.clone(), e.clone())))
            .collect()
    }

    /// Number of unacknowledged entries for a device.
    pub fn pending(&self, device_id: &str) -> usize {
        self.backlogs.get(device_id).map_or(0, Vec::len)
    }

    /// Number of unacknowledged entries across all devices.
    pub fn total_pending(&self) -> usize {
        self.backlogs.values().map(Vec::len).sum()
    }
}
