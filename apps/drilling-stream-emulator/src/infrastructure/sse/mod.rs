//! Server-Sent Events Endpoint
//!
//! HTTP surface for streaming clients.
//!
//! # Endpoints
//!
//! - `GET /sse/stream?clientId=<id>` - Long-lived `text/event-stream`, one
//!   `data:` event per broadcast frame
//! - `GET /sse/status` - Registry status as JSON
//! - `POST /sse/refresh` - Reload records from the data source
//!
//! Each stream request registers a bounded channel as the client's sink. The
//! response body owns a guard that unregisters that exact connection when
//! the client goes away.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::application::ports::{ClientSink, SendError};
use crate::infrastructure::broadcast::{ConnectionId, RegistryStatus, SharedBroadcastRegistry};

/// Service name reported by `/sse/status`.
pub const SERVICE_NAME: &str = "SSE Drilling Data Emulator";

// =============================================================================
// Channel Sink
// =============================================================================

/// [`ClientSink`] that feeds a bounded channel drained by the HTTP response.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    /// Wrap a channel sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        self.tx.send(payload).await.map_err(|_| SendError::Closed)
    }
}

// =============================================================================
// Client Stream
// =============================================================================

struct DisconnectGuard {
    registry: SharedBroadcastRegistry,
    client_id: String,
    connection: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self
            .registry
            .unregister_connection(&self.client_id, self.connection)
        {
            tracing::debug!(client_id = %self.client_id, "Stream closed by client");
        }
    }
}

/// Event stream for one client; unregisters on drop.
struct ClientStream {
    frames: ReceiverStream<Arc<str>>,
    _guard: DisconnectGuard,
}

impl Stream for ClientStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames)
            .poll_next(cx)
            .map(|frame| frame.map(|payload| Ok(Event::default().data(payload))))
    }
}

// =============================================================================
// State
// =============================================================================

/// Shared state for the stream endpoints.
pub struct StreamState {
    registry: SharedBroadcastRegistry,
    client_buffer: usize,
}

impl StreamState {
    /// Create state. `client_buffer` is clamped to at least 1.
    #[must_use]
    pub fn new(registry: SharedBroadcastRegistry, client_buffer: usize) -> Self {
        Self {
            registry,
            client_buffer: client_buffer.max(1),
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Query string for `/sse/stream`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Caller-chosen client id.
    pub client_id: Option<String>,
}

/// `/sse/status` body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service name.
    pub service: &'static str,
    /// Always "active" while the server answers.
    pub status: &'static str,
    /// Registry snapshot.
    #[serde(flatten)]
    pub registry: RegistryStatus,
}

/// `/sse/refresh` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Whether the reload succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Rows now cached, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,
}

// =============================================================================
// Router
// =============================================================================

/// Build the stream router.
pub fn router(state: Arc<StreamState>) -> Router {
    Router::new()
        .route("/sse/stream", get(stream_handler))
        .route("/sse/status", get(status_handler))
        .route("/sse/refresh", post(refresh_handler))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn stream_handler(
    State(state): State<Arc<StreamState>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let client_id = query
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (tx, rx) = mpsc::channel(state.client_buffer);
    let connection = state
        .registry
        .register(client_id.clone(), Arc::new(ChannelSink::new(tx)));

    let stream = ClientStream {
        frames: ReceiverStream::new(rx),
        _guard: DisconnectGuard {
            registry: Arc::clone(&state.registry),
            client_id,
            connection,
        },
    };

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

async fn status_handler(State(state): State<Arc<StreamState>>) -> impl IntoResponse {
    Json(StatusResponse {
        service: SERVICE_NAME,
        status: "active",
        registry: state.registry.status(),
    })
}

async fn refresh_handler(State(state): State<Arc<StreamState>>) -> impl IntoResponse {
    match state.registry.refresh().await {
        Ok(total_rows) => (
            StatusCode::OK,
            Json(RefreshResponse {
                success: true,
                message: "Records reloaded from data source".to_string(),
                timestamp: Utc::now(),
                total_rows: Some(total_rows),
            }),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(RefreshResponse {
                success: false,
                message: e.to_string(),
                timestamp: Utc::now(),
                total_rows: None,
            }),
        ),
    }
}

// =============================================================================
// Server
// =============================================================================

/// SSE HTTP server.
pub struct StreamServer {
    port: u16,
    state: Arc<StreamState>,
    cancel: CancellationToken,
}

impl StreamServer {
    /// Create a new stream server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<StreamState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// Open streams end when the broadcast loop releases its clients, which
    /// lets graceful shutdown complete.
    ///
    /// # Errors
    ///
    /// Returns `StreamServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), StreamServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StreamServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "SSE server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| StreamServerError::ServerFailed(e.to_string()))?;

        tracing::info!("SSE server stopped");
        Ok(())
    }
}

/// Stream server errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{MockRecordSource, SourceError};
    use crate::application::services::DataSource;
    use crate::domain::record::Record;
    use crate::infrastructure::broadcast::{BroadcastConfig, BroadcastRegistry};

    fn app(response: Result<Vec<Record>, SourceError>) -> (Router, SharedBroadcastRegistry) {
        let mut mock = MockRecordSource::new();
        mock.expect_fetch_all().return_once(move || response);
        let registry = Arc::new(BroadcastRegistry::new(
            BroadcastConfig {
                interval: Duration::from_millis(250),
                send_timeout: Duration::from_millis(50),
            },
            Arc::new(DataSource::new(Arc::new(mock))),
            CancellationToken::new(),
        ));
        let router = router(Arc::new(StreamState::new(Arc::clone(&registry), 4)));
        (router, registry)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn status_route_reports_service_and_registry() {
        let (app, registry) = app(Ok(Vec::new()));
        registry.register("rig-3", Arc::new(ChannelSink::new(mpsc::channel(1).0)));

        let response = app
            .oneshot(request(Method::GET, "/sse/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["service"], SERVICE_NAME);
        assert_eq!(body["status"], "active");
        assert_eq!(body["clientsCount"], 1);
        assert_eq!(body["intervalMs"], 250);
        assert_eq!(body["clients"][0]["id"], "rig-3");
    }

    #[tokio::test]
    async fn refresh_route_maps_source_failure_to_bad_gateway() {
        let (app, _registry) = app(Err(SourceError::Unavailable("timeout".to_string())));

        let response = app
            .oneshot(request(Method::POST, "/sse/refresh"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "data source unavailable: timeout");
        assert!(body.get("totalRows").is_none());
    }

    #[tokio::test]
    async fn refresh_route_reports_loaded_rows() {
        let (app, registry) = app(Ok(vec![
            Record::new().with_int("depth", 1),
            Record::new().with_int("depth", 2),
        ]));

        let response = app
            .oneshot(request(Method::POST, "/sse/refresh"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["totalRows"], 2);
        assert!(registry.data_source().is_loaded());
    }

    #[tokio::test]
    async fn routes_reject_wrong_method() {
        let (app, _registry) = app(Ok(Vec::new()));

        let status = app
            .clone()
            .oneshot(request(Method::POST, "/sse/status"))
            .await
            .unwrap()
            .status();
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let refresh = app
            .oneshot(request(Method::GET, "/sse/refresh"))
            .await
            .unwrap()
            .status();
        assert_eq!(refresh, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);

        sink.send(Arc::from("{}")).await.unwrap();
        drop(rx);
        assert_eq!(sink.send(Arc::from("{}")).await, Err(SendError::Closed));
    }

    #[test]
    fn refresh_response_omits_rows_on_failure() {
        let body = serde_json::to_value(RefreshResponse {
            success: false,
            message: "data source unavailable: 401".to_string(),
            timestamp: Utc::now(),
            total_rows: None,
        })
        .unwrap();
        assert_eq!(body["success"], false);
        assert!(body.get("totalRows").is_none());
    }

    #[test]
    fn status_response_flattens_registry() {
        let body = serde_json::to_value(StatusResponse {
            service: SERVICE_NAME,
            status: "active",
            registry: RegistryStatus {
                clients_count: 0,
                interval_ms: 1000,
                is_active: true,
                clients: Vec::new(),
            },
        })
        .unwrap();
        assert_eq!(body["service"], "SSE Drilling Data Emulator");
        assert_eq!(body["clientsCount"], 0);
        assert_eq!(body["intervalMs"], 1000);
        assert_eq!(body["isActive"], true);
    }
}
