//! WebSocket endpoint for streaming clients.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use mediot_common::ClientMessage;

use crate::clients::ClientId;
use crate::config::HttpConfig;
use crate::dispatcher::BridgeEvent;
use crate::error::{BridgeError, Result};

#[derive(Clone)]
struct AppState {
    events: mpsc::UnboundedSender<BridgeEvent>,
}

fn create_router(events: mpsc::UnboundedSender<BridgeEvent>, config: &HttpConfig) -> Router {
    let state = AppState { events };

    Router::new()
        .route(&config.path, get(ws_handler))
        .route("/health", get(health_handler))
        .layer(cors_layer(&config.allowed_origins))
        .with_state(state)
}

/// Any origin when none are configured, otherwise only the listed ones.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = ClientId::next();
    let (tx, mut outbound) = mpsc::unbounded_channel();

    if state
        .events
        .send(BridgeEvent::ClientConnected { client, sender: tx })
        .is_err()
    {
        return;
    }
    info!(client = %client, "Streaming client connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(client = %client, error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                    Ok(message) => {
                        if state.events.send(BridgeEvent::Client { client, message }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(client = %client, error = %e, "Dropping malformed client message");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client = %client, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    if state
        .events
        .send(BridgeEvent::ClientDisconnected(client))
        .is_err()
    {
        tracing::debug!(client = %client, "Dispatcher gone, disconnect not delivered");
    }
    info!(client = %client, "Streaming client disconnected");
}

/// Streaming client server.
pub struct HttpServer {
    events: mpsc::UnboundedSender<BridgeEvent>,
    config: HttpConfig,
}

impl HttpServer {
    pub fn new(events: mpsc::UnboundedSender<BridgeEvent>, config: HttpConfig) -> Self {
        Self { events, config }
    }

    /// Run the server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.config.listen_addr()?;
        let router = create_router(self.events, &self.config);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::config(format!("Failed to bind to {}: {}", addr, e)))?;

        info!(addr = %addr, path = %self.config.path, "Streaming endpoint listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router(allowed_origins: Vec<String>) -> Router {
        let (events, _rx) = mpsc::unbounded_channel();
        let config = HttpConfig {
            allowed_origins,
            ..Default::default()
        };
        create_router(events, &config)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router(Vec::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_path_requires_upgrade() {
        let response = router(Vec::new())
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let response = router(Vec::new())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_listed_origin() {
        let response = router(vec!["http://localhost:3000".to_string()])
            .oneshot(
                Request::get("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_cors_rejects_other_origin() {
        let response = router(vec!["http://localhost:3000".to_string()])
            .oneshot(
                Request::get("/health")
                    .header("origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
