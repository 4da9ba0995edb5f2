//! Broker transport over Zenoh.
//!
//! The dispatcher never touches the Zenoh session directly. It queues
//! [`BrokerRequest`]s through a [`BrokerHandle`]; a single [`ZenohBroker`]
//! worker executes them strictly in order and reports device (un)subscription
//! outcomes back as [`BrokerAck`] events. Inbound samples are forwarded from
//! the subscriber callbacks into the same event queue.
//!
//! # Topics
//!
//! - Live data: `<prefix>/<device_id>/data` and `<prefix>/<device_id>/wave`
//! - Control: `<prefix>/<device_id>/configuration` (publish only)
//! - Imaging: fixed topic, `dicom/data` by default

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use zenoh::Session;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};

use mediot_common::TopicScheme;

use crate::dispatcher::BridgeEvent;
use crate::error::{BridgeError, Result};
use crate::supervisor::LinkEvent;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Work queued for the broker worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerRequest {
    /// Subscribe a device's live topics; acknowledged with [`BrokerAck::Subscribed`].
    SubscribeDevice(String),
    /// Unsubscribe a device's live topics; acknowledged with [`BrokerAck::Unsubscribed`].
    UnsubscribeDevice(String),
    /// (Re)subscribe a single topic; outcome is only logged.
    Subscribe(String),
    /// Publish a payload; outcome is only logged.
    Publish { topic: String, payload: Vec<u8> },
}

/// Outcome of a device (un)subscription.
#[derive(Debug)]
pub enum BrokerAck {
    Subscribed { device_id: String, result: Result<()> },
    Unsubscribed { device_id: String, result: Result<()> },
}

/// Sending side of the broker request queue.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    requests: mpsc::UnboundedSender<BrokerRequest>,
}

impl BrokerHandle {
    /// Create a handle and the receiver the broker worker consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BrokerRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Self { requests }, rx)
    }

    pub fn subscribe_device(&self, device_id: &str) {
        self.send(BrokerRequest::SubscribeDevice(device_id.to_string()));
    }

    pub fn unsubscribe_device(&self, device_id: &str) {
        self.send(BrokerRequest::UnsubscribeDevice(device_id.to_string()));
    }

    pub fn subscribe(&self, topic: impl Into<String>) {
        self.send(BrokerRequest::Subscribe(topic.into()));
    }

    pub fn publish(&self, topic: impl Into<String>, payload: Vec<u8>) {
        self.send(BrokerRequest::Publish {
            topic: topic.into(),
            payload,
        });
    }

    fn send(&self, request: BrokerRequest) {
        if let Err(e) = self.requests.send(request) {
            tracing::warn!(request = ?e.0, "Broker worker stopped, dropping request");
        }
    }
}

/// Executes broker requests against a Zenoh session.
pub struct ZenohBroker {
    session: Arc<Session>,
    topics: TopicScheme,
    subscribers: HashMap<String, Subscriber<()>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl ZenohBroker {
    pub fn new(
        session: Arc<Session>,
        topics: TopicScheme,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            session,
            topics,
            subscribers: HashMap::new(),
            events,
        }
    }

    /// Process requests until the queue closes, then undeclare everything.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<BrokerRequest>) {
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }

        for (topic, subscriber) in self.subscribers.drain() {
            if let Err(e) = subscriber.undeclare().await {
                tracing::debug!(topic = %topic, error = %e, "Failed to undeclare subscriber");
            }
        }
        tracing::info!("Broker worker stopped");
    }

    async fn handle(&mut self, request: BrokerRequest) {
        match request {
            BrokerRequest::SubscribeDevice(device_id) => {
                let mut result = Ok(());
                for topic in self.topics.live_topics(&device_id) {
                    if let Err(e) = self.subscribe(&topic).await {
                        result = Err(e);
                        break;
                    }
                }
                self.emit(BridgeEvent::Broker(BrokerAck::Subscribed { device_id, result }));
            }
            BrokerRequest::UnsubscribeDevice(device_id) => {
                let mut result = Ok(());
                for topic in self.topics.live_topics(&device_id) {
                    if let Err(e) = self.unsubscribe(&topic).await {
                        result = Err(e);
                        break;
                    }
                }
                self.emit(BridgeEvent::Broker(BrokerAck::Unsubscribed { device_id, result }));
            }
            BrokerRequest::Subscribe(topic) => {
                if let Err(e) = self.subscribe(&topic).await {
                    tracing::warn!(topic = %topic, error = %e, "Resubscription failed");
                }
            }
            BrokerRequest::Publish { topic, payload } => {
                match self.session.put(&topic, payload).await {
                    Ok(()) => tracing::debug!(topic = %topic, "Published"),
                    Err(e) => {
                        let err = BridgeError::Publish {
                            topic: topic.clone(),
                            message: e.to_string(),
                        };
                        tracing::warn!(error = %err, "Publish failed");
                    }
                }
            }
        }
    }

    /// Declare a subscriber for `topic`, replacing any existing declaration.
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if let Some(previous) = self.subscribers.remove(topic) {
            if let Err(e) = previous.undeclare().await {
                tracing::debug!(topic = %topic, error = %e, "Failed to undeclare stale subscriber");
            }
        }

        let events = self.events.clone();
        let subscriber = self
            .session
            .declare_subscriber(topic.to_string())
            .callback(move |sample: Sample| {
                if sample.kind() == SampleKind::Delete {
                    return;
                }
                let message = InboundMessage {
                    topic: sample.key_expr().as_str().to_string(),
                    payload: sample.payload().to_bytes().into_owned(),
                };
                if events.send(BridgeEvent::Inbound(message)).is_err() {
                    tracing::trace!("Dispatcher gone, dropping sample");
                }
            })
            .await
            .map_err(|e| BridgeError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        self.subscribers.insert(topic.to_string(), subscriber);
        tracing::info!(topic = %topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let Some(subscriber) = self.subscribers.remove(topic) else {
            tracing::debug!(topic = %topic, "Not subscribed, nothing to undeclare");
            return Ok(());
        };

        subscriber
            .undeclare()
            .await
            .map_err(|e| BridgeError::Unsubscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(topic = %topic, "Unsubscribed");
        Ok(())
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Dispatcher gone, dropping broker acknowledgment");
        }
    }
}

/// Samples the broker link and reports state changes.
///
/// In client mode the link is up while a router is reachable; in peer and
/// router modes it is up once the session is open. Reconnecting is left to
/// Zenoh; the monitor only observes.
pub struct LinkMonitor {
    session: Arc<Session>,
    requires_router: bool,
    interval: Duration,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl LinkMonitor {
    pub fn new(
        session: Arc<Session>,
        requires_router: bool,
        interval: Duration,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            session,
            requires_router,
            interval,
            events,
        }
    }

    pub async fn run(self) {
        if self.send(LinkEvent::Connecting).is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        let mut link_up: Option<bool> = None;

        loop {
            ticker.tick().await;

            let up = self.probe().await;
            if link_up == Some(up) {
                continue;
            }
            link_up = Some(up);

            let event = if up {
                LinkEvent::Connected
            } else {
                LinkEvent::Disconnected
            };
            if self.send(event).is_err() {
                break;
            }
        }
    }

    async fn probe(&self) -> bool {
        if !self.requires_router {
            return true;
        }
        let mut routers = self.session.info().routers_zid().await;
        routers.next().is_some()
    }

    fn send(&self, event: LinkEvent) -> std::result::Result<(), ()> {
        self.events.send(BridgeEvent::Link(event)).map_err(|_| ())
    }
}
