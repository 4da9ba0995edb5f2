//! Broker link state tracking.

use std::fmt;

use mediot_common::TopicScheme;

use crate::registry::{PendingOp, SubscriptionRegistry};

/// State of the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Link event reported by the broker transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

/// Follows the broker link and decides what to resubscribe after a reconnect.
///
/// Retrying the link itself is left to the transport.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    state: LinkState,
    topics: TopicScheme,
}

impl ConnectionSupervisor {
    pub fn new(topics: TopicScheme) -> Self {
        Self {
            state: LinkState::Disconnected,
            topics,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Apply a link event and return the topics to (re)subscribe.
    ///
    /// Entering `Connected` from any other state yields the live topics of
    /// every active device followed by the imaging topic. Devices with an
    /// unsubscribe awaiting confirmation are left out. Every other event
    /// yields nothing.
    pub fn on_event(&mut self, event: LinkEvent, registry: &SubscriptionRegistry) -> Vec<String> {
        let previous = self.state;

        match event {
            LinkEvent::Connecting => {
                self.state = LinkState::Connecting;
                tracing::info!(previous = %previous, "Connecting to broker");
                Vec::new()
            }
            LinkEvent::Connected => {
                self.state = LinkState::Connected;
                if previous == LinkState::Connected {
                    return Vec::new();
                }

                let devices: Vec<String> = registry
                    .active_devices()
                    .into_iter()
                    .filter(|device| registry.pending_op(device) != Some(PendingOp::Unsubscribe))
                    .collect();
                tracing::info!(
                    previous = %previous,
                    active_devices = devices.len(),
                    "Broker link up, restoring subscriptions"
                );

                let mut topics: Vec<String> = devices
                    .iter()
                    .flat_map(|device| self.topics.live_topics(device))
                    .collect();
                topics.push(self.topics.imaging().to_string());
                topics
            }
            LinkEvent::Disconnected => {
                self.state = LinkState::Disconnected;
                tracing::warn!(previous = %previous, "Broker link down");
                Vec::new()
            }
            LinkEvent::Error(message) => {
                self.state = LinkState::Error;
                tracing::error!(previous = %previous, error = %message, "Broker link error");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SubscriptionStore;

    async fn registry_with(
        dir: &tempfile::TempDir,
        active: &[&str],
        inactive: &[&str],
    ) -> SubscriptionRegistry {
        let store = SubscriptionStore::new(dir.path().join("subs.json"));
        let mut registry = SubscriptionRegistry::open(store).await.unwrap();
        for device in active.iter().chain(inactive) {
            registry.start(device);
            registry.confirm_subscribed(device).await.unwrap();
        }
        for device in inactive {
            registry.stop(device);
            registry.confirm_unsubscribed(device).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_connected_resubscribes_active_only() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&dir, &["A"], &["B"]).await;
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::default());

        assert!(supervisor.on_event(LinkEvent::Connecting, &registry).is_empty());
        let topics = supervisor.on_event(LinkEvent::Connected, &registry);

        assert_eq!(
            topics,
            vec![
                "mediot/A/data".to_string(),
                "mediot/A/wave".to_string(),
                "dicom/data".to_string(),
            ]
        );
        assert_eq!(supervisor.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_pending_stop_not_resubscribed() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry_with(&dir, &["A", "B"], &[]).await;
        registry.stop("A");
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::default());

        assert_eq!(
            supervisor.on_event(LinkEvent::Connected, &registry),
            vec![
                "mediot/B/data".to_string(),
                "mediot/B/wave".to_string(),
                "dicom/data".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_connected_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&dir, &["A"], &[]).await;
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::default());

        assert!(!supervisor.on_event(LinkEvent::Connected, &registry).is_empty());
        assert!(supervisor.on_event(LinkEvent::Connected, &registry).is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_after_drop_resubscribes_again() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&dir, &["A"], &[]).await;
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::default());

        supervisor.on_event(LinkEvent::Connected, &registry);
        assert!(supervisor.on_event(LinkEvent::Disconnected, &registry).is_empty());
        assert_eq!(supervisor.state(), LinkState::Disconnected);

        let topics = supervisor.on_event(LinkEvent::Connected, &registry);
        assert_eq!(topics.len(), 3);
    }

    #[tokio::test]
    async fn test_error_recorded_without_resubscribing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&dir, &["A"], &[]).await;
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::default());

        let topics = supervisor.on_event(LinkEvent::Error("refused".to_string()), &registry);
        assert!(topics.is_empty());
        assert_eq!(supervisor.state(), LinkState::Error);

        // Recovery from the error state restores subscriptions
        assert_eq!(supervisor.on_event(LinkEvent::Connected, &registry).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_registry_still_subscribes_imaging() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(&dir, &[], &[]).await;
        let mut supervisor = ConnectionSupervisor::new(TopicScheme::new("ward3", "pacs/notify"));

        assert_eq!(
            supervisor.on_event(LinkEvent::Connected, &registry),
            vec!["pacs/notify".to_string()]
        );
    }
}
