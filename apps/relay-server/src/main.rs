//! Quick Assist relay server: hosts the session registry and the realtime
//! event hub behind a small HTTP/WebSocket surface, for deployments where
//! the two participants are not windows of one browser instance.

mod ws;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use quick_assist::{AssistConfig, AssistError, EventHub, SessionRegistry};
use records::{EditSessionId, ParticipantId, Permission, RecordStore, SharedSession};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<RecordStore>,
    pub hub: Arc<EventHub>,
    pub config: AssistConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("relay_server=debug,quick_assist=debug")
        .init();

    info!("Starting Quick Assist relay server...");

    let config = AssistConfig::default();
    let store = Arc::new(RecordStore::at_path("relay_data")?);
    let registry = Arc::new(SessionRegistry::new(store.clone(), &config));
    let hub = Arc::new(EventHub::new());

    let state = AppState {
        registry,
        store,
        hub,
        config,
    };

    let app = Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:code", get(lookup_session))
        .route("/ws", get(ws::ws_handler))
        // CORS for local development
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = "127.0.0.1:8790";
    info!("Relay server listening on http://{}", addr);
    info!("  POST /api/sessions        - Create shared session");
    info!("  GET  /api/sessions/:code  - Look up session by share code");
    info!("  GET  /ws?code=..&participant=.. - Session event feed");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    owner_session_id: Option<EditSessionId>,
    host: ParticipantId,
    permission: Permission,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SharedSession>, (StatusCode, String)> {
    let owner = request.owner_session_id.unwrap_or_default();
    let session = state
        .registry
        .create(owner, request.host, request.permission)
        .map_err(internal)?;
    Ok(Json(session))
}

async fn lookup_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SharedSession>, (StatusCode, String)> {
    match state.registry.lookup_code(&code) {
        Ok(session) => Ok(Json(session)),
        Err(AssistError::NotFound(code)) => Err((
            StatusCode::NOT_FOUND,
            format!("no active session for code {code}"),
        )),
        Err(err) => Err(internal(err)),
    }
}

fn internal(err: AssistError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
