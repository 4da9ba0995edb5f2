//! MedIoT Bridge
//!
//! Bridges medical device telemetry published on Zenoh to live streaming
//! clients connected over WebSocket.
//!
//! # Overview
//!
//! - [`SubscriptionRegistry`] decides and persists which devices are monitored
//! - [`BatchAccumulator`] pairs vital samples with waveform frames per device
//! - [`DeliveryTracker`] keeps emitted batches until clients acknowledge them
//! - [`ConnectionSupervisor`] restores subscriptions when the broker link returns
//! - [`ImageRetriever`] downloads images announced on the imaging topic
//! - [`BridgeDispatcher`] owns all of the above and routes every [`BridgeEvent`]
//! - [`BridgeRunner`] wires the dispatcher to Zenoh and the HTTP server
//!
//! # Example
//!
//! ```ignore
//! use mediot_bridge::{BridgeArgs, run_bridge};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_bridge(BridgeArgs::parse()).await
//! }
//! ```

pub mod accumulator;
mod args;
pub mod broker;
pub mod clients;
pub mod config;
pub mod delivery;
pub mod dispatcher;
mod error;
pub mod http;
pub mod imaging;
pub mod registry;
mod runner;
mod status;
pub mod store;
pub mod supervisor;

pub use accumulator::{BatchAccumulator, PendingBatch};
pub use args::BridgeArgs;
pub use broker::{BrokerAck, BrokerHandle, BrokerRequest, InboundMessage};
pub use clients::{ClientHub, ClientId};
pub use config::{BridgeConfig, MediotConfig};
pub use delivery::{BacklogEntry, DeliveryTracker};
pub use dispatcher::{BridgeDispatcher, BridgeEvent};
pub use error::{BridgeError, Result};
pub use imaging::ImageRetriever;
pub use registry::{MonitorSubscription, PendingOp, SubscriptionIntent, SubscriptionRegistry};
pub use runner::{BridgeRunner, run_bridge};
pub use status::BridgeStatus;
pub use store::{StoredSubscription, SubscriptionStore};
pub use supervisor::{ConnectionSupervisor, LinkEvent, LinkState};
