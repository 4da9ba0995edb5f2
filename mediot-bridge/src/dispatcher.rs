//! Event routing between the broker, streaming clients and the imaging store.
//!
//! All bridge state lives in [`BridgeDispatcher`] and is only touched from its
//! event loop. Broker samples, broker acknowledgments, link changes, client
//! commands and finished image downloads all arrive as [`BridgeEvent`]s on a
//! single queue and are handled one at a time.

use serde_json::value::RawValue;
use tokio::sync::mpsc;
use uuid::Uuid;

use mediot_common::{
    AckCommand, ClientMessage, DeviceChannel, ImagingRequest, ImagingResult, ParsedTopic,
    ServerEvent, StartMonitorCommand, TopicScheme, VitalBatchMessage, VitalReadings, VitalSample,
    WaveformFrame, validate_device_id,
};

use crate::accumulator::{BatchAccumulator, PendingBatch};
use crate::broker::{BrokerAck, BrokerHandle, InboundMessage};
use crate::clients::{ClientHub, ClientId};
use crate::delivery::DeliveryTracker;
use crate::imaging::ImageRetriever;
use crate::registry::{SubscriptionIntent, SubscriptionRegistry};
use crate::supervisor::{ConnectionSupervisor, LinkEvent};

/// Everything the dispatcher reacts to.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A sample arrived on a subscribed topic.
    Inbound(InboundMessage),
    /// The broker worker finished a device (un)subscription.
    Broker(BrokerAck),
    /// The broker link changed state.
    Link(LinkEvent),
    ClientConnected {
        client: ClientId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    ClientDisconnected(ClientId),
    /// A parsed message from a streaming client.
    Client {
        client: ClientId,
        message: ClientMessage,
    },
    /// An image download finished.
    ImageFetched(ImagingResult),
}

/// Owns the bridge state and routes every [`BridgeEvent`].
pub struct BridgeDispatcher {
    topics: TopicScheme,
    registry: SubscriptionRegistry,
    accumulator: BatchAccumulator,
    tracker: DeliveryTracker<PendingBatch>,
    supervisor: ConnectionSupervisor,
    clients: ClientHub,
    broker: BrokerHandle,
    retriever: ImageRetriever,
    events: mpsc::UnboundedSender<BridgeEvent>,
    next_id: u64,
}

impl BridgeDispatcher {
    /// `events` must feed the queue this dispatcher runs on; finished image
    /// downloads are posted back through it.
    pub fn new(
        topics: TopicScheme,
        registry: SubscriptionRegistry,
        broker: BrokerHandle,
        retriever: ImageRetriever,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            supervisor: ConnectionSupervisor::new(topics.clone()),
            topics,
            registry,
            accumulator: BatchAccumulator::new(),
            tracker: DeliveryTracker::new(),
            clients: ClientHub::new(),
            broker,
            retriever,
            events,
            next_id: 0,
        }
    }

    /// Handle events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<BridgeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Dispatcher stopped");
    }

    pub async fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Inbound(message) => self.on_inbound(message),
            BridgeEvent::Broker(ack) => self.on_broker_ack(ack).await,
            BridgeEvent::Link(event) => {
                for topic in self.supervisor.on_event(event, &self.registry) {
                    self.broker.subscribe(topic);
                }
            }
            BridgeEvent::ClientConnected { client, sender } => {
                self.clients.register(client, sender);
                self.clients.send_to(client, ServerEvent::welcome());
                tracing::info!(client = %client, clients = self.clients.len(), "Client registered");
            }
            BridgeEvent::ClientDisconnected(client) => {
                if self.clients.remove(client) {
                    tracing::info!(client = %client, clients = self.clients.len(), "Client removed");
                }
            }
            BridgeEvent::Client { client, message } => self.on_client_message(client, message),
            BridgeEvent::ImageFetched(result) => {
                tracing::info!(patient = %result.patient_id, path = %result.path, "Forwarding image");
                self.clients.broadcast(&ServerEvent::DicomData(result));
            }
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn accumulator(&self) -> &BatchAccumulator {
        &self.accumulator
    }

    pub fn tracker(&self) -> &DeliveryTracker<PendingBatch> {
        &self.tracker
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn clients(&self) -> &ClientHub {
        &self.clients
    }

    fn on_inbound(&mut self, message: InboundMessage) {
        let Some(parsed) = self.topics.parse(&message.topic) else {
            tracing::debug!(topic = %message.topic, "Sample on unrouted topic");
            return;
        };

        match parsed {
            ParsedTopic::Device {
                device_id,
                channel: DeviceChannel::Data,
            } => {
                let readings = match VitalReadings::from_slice(&message.payload) {
                    Ok(readings) => readings,
                    Err(e) => {
                        tracing::warn!(device = %device_id, error = %e, "Dropping malformed vital sample");
                        return;
                    }
                };
                let sample = VitalSample::new(self.allocate_id(), device_id, readings);
                self.accumulator.add_sample(device_id, sample);
                self.flush(device_id);
            }
            ParsedTopic::Device {
                device_id,
                channel: DeviceChannel::Wave,
            } => {
                let frame = WaveformFrame::new(self.allocate_id(), device_id, message.payload);
                self.accumulator.set_waveform(device_id, frame);
                self.flush(device_id);
            }
            ParsedTopic::Device {
                device_id,
                channel: DeviceChannel::Configuration,
            } => {
                tracing::trace!(device = %device_id, "Ignoring configuration echo");
            }
            ParsedTopic::Imaging => match ImagingRequest::from_slice(&message.payload) {
                Ok(request) => self.spawn_fetch(request),
                Err(e) => tracing::warn!(error = %e, "Dropping malformed imaging notification"),
            },
        }
    }

    fn flush(&mut self, device_id: &str) {
        let Some(batch) = self.accumulator.try_flush(device_id) else {
            return;
        };

        let id = self.tracker.record(device_id, batch.clone());
        let samples = batch.samples.len();
        let reached = self
            .clients
            .broadcast(&ServerEvent::MonitorVitalData(batch_message(Some(id), batch)));

        tracing::debug!(
            device = %device_id,
            message_id = %id,
            samples,
            clients = reached,
            "Batch emitted"
        );
    }

    fn spawn_fetch(&self, request: ImagingRequest) {
        let retriever = self.retriever.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match retriever.fetch(request).await {
                Ok(result) => {
                    if events.send(BridgeEvent::ImageFetched(result)).is_err() {
                        tracing::debug!("Dispatcher gone, dropping image");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Dropping imaging notification"),
            }
        });
    }

    async fn on_broker_ack(&mut self, ack: BrokerAck) {
        match ack {
            BrokerAck::Subscribed {
                device_id,
                result: Ok(()),
            } => {
                if let Err(e) = self.registry.confirm_subscribed(&device_id).await {
                    tracing::error!(device = %device_id, error = %e, "Subscription not recorded");
                } else {
                    tracing::info!(device = %device_id, "Monitoring started");
                }
            }
            BrokerAck::Subscribed {
                device_id,
                result: Err(e),
            } => {
                tracing::warn!(device = %device_id, error = %e, "Subscribe failed");
                self.registry.subscribe_failed(&device_id);
            }
            BrokerAck::Unsubscribed {
                device_id,
                result: Ok(()),
            } => {
                if let Err(e) = self.registry.confirm_unsubscribed(&device_id).await {
                    tracing::error!(device = %device_id, error = %e, "Unsubscription not recorded");
                } else {
                    tracing::info!(device = %device_id, "Monitoring stopped");
                }
            }
            BrokerAck::Unsubscribed {
                device_id,
                result: Err(e),
            } => {
                tracing::warn!(device = %device_id, error = %e, "Unsubscribe failed");
                self.registry.unsubscribe_failed(&device_id);
            }
        }
    }

    fn on_client_message(&mut self, client: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::StartMonitor(data) => self.on_start_monitor(client, &data),
            ClientMessage::Ack(AckCommand {
                monitor_id,
                message_id,
            }) => {
                if !self.tracker.ack(&monitor_id, message_id) {
                    tracing::debug!(
                        client = %client,
                        device = %monitor_id,
                        message_id = %message_id,
                        "Ack for unknown batch"
                    );
                }
            }
            ClientMessage::Reconnect => {
                let backlog = self.tracker.replay_all();
                tracing::info!(client = %client, batches = backlog.len(), "Replaying backlog");
                for (_, entry) in backlog {
                    let event =
                        ServerEvent::MonitorVitalData(batch_message(Some(entry.id), entry.payload));
                    if !self.clients.send_to(client, event) {
                        break;
                    }
                }
            }
        }
    }

    fn on_start_monitor(&mut self, client: ClientId, data: &RawValue) {
        let (command, raw) = match StartMonitorCommand::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "Dropping malformed StartMonitor");
                return;
            }
        };
        let device_id = command.monitor_id.as_str();
        if let Err(e) = validate_device_id(device_id) {
            tracing::warn!(client = %client, error = %e, "Rejecting StartMonitor");
            return;
        }

        tracing::info!(
            client = %client,
            device = %device_id,
            patient_ipp = command.patient_ipp.as_deref().unwrap_or(""),
            patient_name = command.patient_name.as_deref().unwrap_or(""),
            event = %command.event,
            "StartMonitor"
        );

        let intent = if command.is_stop() {
            self.registry.stop(device_id)
        } else {
            self.registry.start(device_id)
        };
        match intent {
            SubscriptionIntent::Subscribe => self.broker.subscribe_device(device_id),
            SubscriptionIntent::Unsubscribe => self.broker.unsubscribe_device(device_id),
            SubscriptionIntent::Unchanged => {
                tracing::debug!(device = %device_id, "Subscription already in requested state");
            }
        }

        self.broker.publish(self.topics.configuration(device_id), raw);

        if let Some(pending) = self.accumulator.pending(device_id) {
            let preview = batch_message(None, pending.clone());
            self.clients
                .send_to(client, ServerEvent::MonitorVitalData(preview));
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn batch_message(message_id: Option<Uuid>, batch: PendingBatch) -> VitalBatchMessage {
    VitalBatchMessage {
        message_id,
        monitor_id: batch.device_id,
        data: batch.samples,
        wave: batch.waveform,
    }
}
