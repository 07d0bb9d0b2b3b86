use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, RunError};
use crate::messages::Message;
use crate::runtime::AgentRuntime;

#[derive(Clone)]
pub struct ServerState {
    pub agent: Arc<Agent>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatResponse {
    thread_id: String,
    response: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessagesResponse {
    thread_id: String,
    messages: Vec<Message>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/chat", post(start_chat))
        .route("/chat/:thread_id", post(continue_chat))
        .route("/chat/:thread_id/messages", get(list_messages))
        .with_state(state);

    Router::new().nest("/v1", api)
}

pub async fn serve(runtime: AgentRuntime) -> Result<()> {
    let bind_addr = runtime
        .config
        .bind_address
        .parse::<SocketAddr>()
        .context("Invalid bind_address (expected host:port)")?;

    let state = Arc::new(ServerState {
        agent: runtime.agent.clone(),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind HR agent server to {}", bind_addr))?;
    tracing::info!("HR agent listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("HR agent server failed")?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn start_chat(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let thread_id = uuid::Uuid::new_v4().to_string();
    run_chat(&state, thread_id, req.message).await
}

async fn continue_chat(
    State(state): State<Arc<ServerState>>,
    Path(thread_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    run_chat(&state, thread_id, req.message).await
}

async fn run_chat(
    state: &ServerState,
    thread_id: String,
    message: String,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let response = state
        .agent
        .run(&message, &thread_id)
        .await
        .map_err(run_error)?;
    Ok(Json(ChatResponse {
        thread_id,
        response,
    }))
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<MessagesResponse>, (StatusCode, String)> {
    let history = state.agent.history(&thread_id).await.map_err(run_error)?;
    if history.is_empty() {
        return Err(not_found(format!("Thread not found: {}", thread_id)));
    }
    Ok(Json(MessagesResponse {
        thread_id,
        messages: history.into_messages(),
    }))
}

fn run_error(error: RunError) -> (StatusCode, String) {
    let status = match &error {
        RunError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RunError::Model { .. } => StatusCode::BAD_GATEWAY,
        RunError::DidNotConverge { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RunError::Persistence { .. } | RunError::InvariantViolation { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, error.to_string())
}

fn not_found(message: String) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, message)
}
