//! HTTP surface: browser session lifecycle and SSE event streams.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use agent::{AgentRuntime, EventSink, SessionConfig, SessionEventHub};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::{Stream, StreamExt, future};
use proto::{AgentEvent, GatewayError, SessionId};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::request::ChatRequest;
use crate::session::BrowserProvider;

// ─── Shared state ──────────────────────────────────────────

/// Shared state for the axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub hub: Arc<SessionEventHub>,
    pub provider: Arc<dyn BrowserProvider>,
    /// Settings used when a chat request does not override them.
    pub defaults: SessionConfig,
    pub session_timeout_ms: u64,
}

// ─── Errors ────────────────────────────────────────────────

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match err {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ─── Router ────────────────────────────────────────────────

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/new-session", post(new_session))
        .route("/release-session/{id}", get(release_session))
        .route("/events/{id}", get(url_events))
        .route("/tool-results/{id}", get(tool_result_events))
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
}

/// Binds `addr` and serves until ctrl-c.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), GatewayError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Server(format!("bind failed: {e}")))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| GatewayError::Server(format!("server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

// ─── Handlers ──────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn new_session(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .provider
        .create_session(state.session_timeout_ms)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to create session: {e}");
            ApiError::new(StatusCode::BAD_GATEWAY, e.to_string())
        })
}

async fn release_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.provider.release_session(&id).await.map(Json).map_err(|e| {
        error!(session = %id, "Failed to release session: {e}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to release session")
    })
}

async fn url_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = SessionId::from(id);
    let stream = state
        .hub
        .subscribe(&session_id)
        .filter_map(move |event| {
            let out = match event {
                AgentEvent::UrlChanged { url } => {
                    Some(Ok(Event::default().data(
                        json!({ "id": session_id.as_str(), "url": url }).to_string(),
                    )))
                }
                _ => None,
            };
            future::ready(out)
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn tool_result_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .hub
        .subscribe(&SessionId::from(id))
        .filter_map(|event| {
            let out = match event {
                AgentEvent::ToolResult { turn } => serde_json::to_string(&turn)
                    .ok()
                    .map(|data| Ok(Event::default().data(data))),
                _ => None,
            };
            future::ready(out)
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Runs one session and streams its model output until the terminal event.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let config = req.session_config(&state.defaults)?;
    let session_id = req.id;
    let history = req.messages;

    // Subscribe before the session starts so no event is missed.
    let subscription = state.hub.subscribe(&session_id);
    info!(session = %session_id, turns = history.len(), "chat session starting");

    let runtime = state.runtime.clone();
    let provider = state.provider.clone();
    let hub = state.hub.clone();
    tokio::spawn(async move {
        let connected = match provider.connect(&session_id).await {
            Ok(connected) => connected,
            Err(e) => {
                error!(session = %session_id, "browser attach failed: {e}");
                hub.emit(&session_id, AgentEvent::Failed { error: e.to_string() });
                return;
            }
        };
        if let Err(e) = runtime
            .run_session(&session_id, history, connected.page.clone(), &config)
            .await
        {
            warn!(session = %session_id, turns = e.history.len(), "chat session ended with error");
        }
        drop(connected);
    });

    let stream = subscription
        .scan(false, |done, event| {
            if *done {
                return future::ready(None);
            }
            *done = event.is_terminal();
            future::ready(Some(event))
        })
        .filter_map(|event| future::ready(chat_event(&event).map(Ok)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// SSE frame for the chat stream; tool results and URL changes have their own endpoints.
fn chat_event(event: &AgentEvent) -> Option<Event> {
    let data = match event {
        AgentEvent::ToolResult { .. } | AgentEvent::UrlChanged { .. } => return None,
        AgentEvent::Stream { event: inner } => serde_json::to_string(inner),
        other => serde_json::to_string(other),
    };
    match data {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            warn!("dropping unserializable event {}: {e}", event.name());
            None
        }
    }
}
