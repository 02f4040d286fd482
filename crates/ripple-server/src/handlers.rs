//! Connection handlers and HTTP routes.
//!
//! This is the glue between the transports and the registry: WebSocket
//! acceptance with credential verification, per-connection read/write
//! tasks, the producer-facing ingestion endpoint, and the health snapshot.

use crate::auth::{AuthError, AuthVerifier};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use ripple_core::{
    spawn_sweepers, ConnectionHandle, ConnectionId, Identity, Registry, RegistryConfig,
    SubscribeOutcome, SweepConfig,
};
use ripple_protocol::{BroadcastRequest, ClientFrame, EventKind, TypingSignal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The subscription registry.
    pub registry: Arc<Registry>,
    /// Bearer credential verifier.
    pub verifier: AuthVerifier,
    /// Server configuration.
    pub config: Config,
    /// Connections accepted since start.
    accepted: AtomicU64,
    /// Connections currently live.
    active: AtomicU64,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if no auth secret is configured.
    pub fn new(config: Config) -> Result<Self> {
        anyhow::ensure!(
            !config.auth.secret.is_empty(),
            "auth secret is not configured (set RIPPLE_AUTH_SECRET or [auth] secret)"
        );

        let registry = Arc::new(Registry::with_config(RegistryConfig {
            typing_idle: config.sweep.typing_idle(),
        }));

        Ok(Self {
            registry,
            verifier: AuthVerifier::new(&config.auth.secret),
            config,
            accepted: AtomicU64::new(0),
            active: AtomicU64::new(0),
        })
    }

    /// Connections accepted since start.
    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Connections currently live.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Build the HTTP router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/broadcast", post(ingest_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let _sweepers = spawn_sweepers(
        Arc::clone(&state.registry),
        SweepConfig {
            typing_interval: config.sweep.typing_sweep_interval(),
            reap_interval: config.sweep.reap_interval(),
        },
    );

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Ripple relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    serve(listener, state).await
}

/// Serve on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind to an ephemeral port.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

fn bearer_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = &query.token {
        return Some(token.clone());
    }
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// WebSocket upgrade handler.
///
/// The credential is checked here, before the upgrade; the registry never
/// sees a connection that did not present a valid token.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(token) = bearer_token(&query, &headers) else {
        warn!(error = %AuthError::MissingToken, "Rejected connection");
        metrics::record_error("auth");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let identity = match state.verifier.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "Rejected connection");
            metrics::record_error("auth");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Handle an authenticated WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    state.accepted.fetch_add(1, Ordering::Relaxed);
    state.active.fetch_add(1, Ordering::Relaxed);

    let connection_id = ConnectionId::generate();
    let (handle, mut outbound_rx) =
        ConnectionHandle::channel(connection_id.clone(), state.config.limits.outbound_buffer);

    debug!(connection = %connection_id, user = %identity.user_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Writer task: drains the outbound buffer into the socket, so pushes
    // enqueued by broadcasts never wait on socket I/O.
    let writer_handle = Arc::clone(&handle);
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match String::from_utf8(frame.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Dropped non-UTF-8 push frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                writer_handle.mark_closed();
                break;
            }
        }
    });

    // Read loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_frame(&text, &state, &handle, &identity);
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    handle_frame(text, &state, &handle, &identity);
                }
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // axum answers pings on its own
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    // Cleanup: exactly one teardown per connection.
    handle.mark_closed();
    state.registry.teardown(&connection_id);
    writer.abort();
    state.active.fetch_sub(1, Ordering::Relaxed);
    metrics::set_active_channels(state.registry.stats().channel_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Handle one decoded inbound frame.
fn handle_frame(
    text: &str,
    state: &Arc<AppState>,
    handle: &Arc<ConnectionHandle>,
    identity: &Identity,
) {
    if text.len() > state.config.limits.max_message_size {
        warn!(
            connection = %handle.id(),
            size = text.len(),
            "Ignoring oversized frame"
        );
        return;
    }

    let frame = match ClientFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection = %handle.id(), error = %e, "Ignoring undecodable frame");
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe {
            channel_name,
            user_id,
            ..
        } => {
            let outcome = state
                .registry
                .subscribe(&channel_name, handle, &user_id, Some(identity));
            if outcome == SubscribeOutcome::Subscribed {
                metrics::record_subscription();
                metrics::set_active_channels(state.registry.stats().channel_count);
            }
        }
        ClientFrame::Unknown => {
            debug!(connection = %handle.id(), "Ignoring unrecognized frame type");
        }
    }
}

/// Client-facing rejection at the ingestion boundary.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or invalid request body.
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

/// Ingestion response: how many subscribers the event was handed to.
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    /// Open subscribers the frame was enqueued for.
    pub delivered: usize,
}

/// Producer-facing ingestion endpoint.
///
/// Validates the event type and required fields before any registry call.
/// Typing signals route through the typing tracker; every other kind is
/// broadcast verbatim as `{event, data}`.
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let request: BroadcastRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid broadcast request: {e}")))?;

    let delivered = if request.kind.is_typing_signal() {
        let signal: TypingSignal = serde_json::from_value(request.message.clone())
            .map_err(|e| ApiError::BadRequest(format!("invalid typing signal: {e}")))?;
        state.registry.set_typing(
            &request.channel_name,
            &signal.user_id,
            &signal.display_name,
            request.kind == EventKind::MemberTyping,
        )
    } else {
        state
            .registry
            .broadcast(&request.channel_name, request.kind, &request.message, None)
    };

    metrics::record_broadcast(request.kind.as_str(), delivered);
    Ok(Json(BroadcastResponse { delivered }))
}

/// Health check handler.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.registry.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "activeConnections": state.active_connections(),
        "totalConnections": state.total_connections(),
        "channels": stats.channels,
    }))
}
