//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use mediot_common::{LoggingConfig, TopicScheme, connect, init_tracing};

use crate::args::BridgeArgs;
use crate::broker::{BrokerHandle, LinkMonitor, ZenohBroker};
use crate::config::{BridgeConfig, MediotConfig};
use crate::dispatcher::{BridgeDispatcher, BridgeEvent};
use crate::error::{BridgeError, Result};
use crate::http::HttpServer;
use crate::imaging::ImageRetriever;
use crate::registry::SubscriptionRegistry;
use crate::status::BridgeStatus;
use crate::store::SubscriptionStore;

/// Manages the lifecycle of the bridge.
///
/// Handles:
/// - Logging initialization
/// - Zenoh connection
/// - Loading the subscription registry before any broker traffic
/// - Spawning the broker worker, link monitor, dispatcher and HTTP server
/// - Graceful shutdown on Ctrl+C or SIGTERM
/// - Status publishing
pub struct BridgeRunner {
    name: String,
    version: String,
    config: MediotConfig,
    topics: TopicScheme,
    session: Arc<zenoh::Session>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl BridgeRunner {
    /// Create a runner with CLI args for log level override.
    ///
    /// Initializes logging and connects to Zenoh.
    pub async fn new_with_args(
        name: impl Into<String>,
        config: MediotConfig,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };
        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let session = Arc::new(
            connect(config.zenoh())
                .await
                .map_err(|e| BridgeError::ZenohConnection(e.to_string()))?,
        );
        tracing::info!(zid = %session.zid(), mode = %config.zenoh.mode, "Connected to Zenoh");

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            name,
            version,
            topics: config.topics.scheme(),
            config,
            session,
            tasks: Vec::new(),
            shutdown,
        })
    }

    /// Spawn a worker task that is aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(future));
    }

    /// Spawn a worker task that returns a Result. Errors are logged.
    pub fn spawn_with_error<F, E>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = name, error = %e, "Worker failed");
            }
        });
    }

    /// Load the registry and start every worker.
    ///
    /// Returns the number of devices restored as active.
    pub async fn start(&mut self) -> Result<usize> {
        let registry =
            SubscriptionRegistry::open(SubscriptionStore::new(&self.config.store.path)).await?;
        let restored = registry.active_devices().len();
        let retriever = ImageRetriever::new(&self.config.imaging)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel::<BridgeEvent>();
        let (broker, requests) = BrokerHandle::channel();

        let dispatcher = BridgeDispatcher::new(
            self.topics.clone(),
            registry,
            broker,
            retriever,
            events_tx.clone(),
        );
        self.spawn(dispatcher.run(events_rx));

        let worker = ZenohBroker::new(self.session.clone(), self.topics.clone(), events_tx.clone());
        self.spawn(worker.run(requests));

        let monitor = LinkMonitor::new(
            self.session.clone(),
            self.config.zenoh.is_client(),
            self.config.link.check_interval(),
            events_tx.clone(),
        );
        self.spawn(monitor.run());

        let server = HttpServer::new(events_tx, self.config.http.clone());
        let shutdown = self.shutdown.subscribe();
        self.spawn_with_error("http", server.run(shutdown));

        Ok(restored)
    }

    /// Run until a shutdown signal is received.
    pub async fn run(self, restored: usize) -> Result<()> {
        let status_topic = self.topics.status();

        let running = BridgeStatus::running(&self.name, &self.version).with_metadata(
            serde_json::json!({
                "active_devices": restored,
                "listen": self.config.http.listen,
            }),
        );
        if let Err(e) = running.publish(&self.session, &status_topic).await {
            tracing::warn!(error = %e, "Failed to publish running status");
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        wait_for_signal().await;
        tracing::info!(bridge = %self.name, "Received shutdown signal");

        if self.shutdown.send(true).is_err() {
            tracing::debug!("HTTP server already stopped");
        }
        // Let the HTTP server drain before tearing everything down
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        for task in &self.tasks {
            task.abort();
        }

        let active_devices = stored_active_devices(&self.config.store.path).await;
        let offline = BridgeStatus::offline(&self.name, &self.version)
            .with_metadata(serde_json::json!({ "active_devices": active_devices }));
        if let Err(e) = offline.publish(&self.session, &status_topic).await {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Goodbye!");
        Ok(())
    }
}

/// Count the devices the durable store records as active.
async fn stored_active_devices(path: &std::path::Path) -> usize {
    match SubscriptionStore::new(path).load().await {
        Ok(stored) => stored.values().filter(|s| s.active).count(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read subscription store");
            0
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Load the configuration named by `args` and run the bridge until shutdown.
pub async fn run_bridge(args: BridgeArgs) -> anyhow::Result<()> {
    let config = MediotConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = BridgeRunner::new_with_args("mediot-bridge", config, Some(&args))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let restored = runner.start().await.map_err(|e| anyhow::anyhow!("{}", e))?;

    runner.run(restored).await.map_err(|e| anyhow::anyhow!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stored_active_devices_counts_active_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        assert_eq!(stored_active_devices(&path).await, 0);

        let mut registry = SubscriptionRegistry::open(SubscriptionStore::new(&path))
            .await
            .unwrap();
        for device in ["A", "B"] {
            registry.start(device);
            registry.confirm_subscribed(device).await.unwrap();
        }
        registry.stop("B");
        registry.confirm_unsubscribed("B").await.unwrap();

        assert_eq!(stored_active_devices(&path).await, 1);
    }
}
