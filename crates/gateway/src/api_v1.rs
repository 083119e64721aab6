//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/ingest`: Ingest a brain dump
//! - `GET  /v1/tasks`: Most recently updated tasks
//! - `PUT  /v1/tasks/{id}/status`: Move a task through its lifecycle
//! - `GET  /v1/conversations/{id}`: Conversation, summary and recent messages
//! - `GET  /v1/conversations/{id}/context`: Context assembly debug view

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use braindump_core::error::{Error, StoreError};
use braindump_core::message::{Conversation, ConversationId, IngestRequest, Message};
use braindump_core::store::ConversationStore;
use braindump_core::task::{Task, TaskId, TaskStatus};
use braindump_pipeline::{AssemblyMetadata, IngestResponse, Ingestor};

/// Default and maximum page sizes.
const DEFAULT_TASK_LIMIT: usize = 50;
const MAX_TASK_LIMIT: usize = 300;
const DEFAULT_MESSAGE_LIMIT: usize = 20;
const MAX_MESSAGE_LIMIT: usize = 200;

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiState {
    pub ingestor: Arc<Ingestor>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiState {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self {
            ingestor,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedApiState = Arc<ApiState>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/ingest", post(ingest_handler))
        .route("/tasks", get(list_tasks_handler))
        .route("/tasks/{id}/status", put(update_task_status_handler))
        .route("/conversations/{id}", get(get_conversation_handler))
        .route("/conversations/{id}/context", get(context_debug_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A JSON error body with its status code.
#[derive(Debug)]
pub struct ApiError {
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

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Error::Store(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TaskStatus,
}

#[derive(Deserialize)]
pub struct ConversationQuery {
    pub messages: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    /// Oldest first.
    pub messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
pub struct ContextDebugResponse {
    pub conversation_id: ConversationId,
    pub instructions: String,
    pub payload: String,
    pub metadata: AssemblyMetadata,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn ingest_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(request) = payload.inspect_err(|e| warn!("Rejected ingest body: {e}"))?;
    info!(
        conversation_id = ?request.conversation_id.as_ref().map(ConversationId::as_str),
        text_len = request.text.len(),
        "v1/ingest request"
    );

    let response = state.ingestor.ingest(request).await?;
    Ok(Json(response))
}

async fn list_tasks_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TASK_LIMIT).min(MAX_TASK_LIMIT);
    let tasks = state.ingestor.store().recent_tasks(limit).await?;

    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

async fn update_task_status_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<TaskId>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(update) = payload?;
    let task = state
        .ingestor
        .store()
        .set_task_status(id, update.status)
        .await?;
    info!(task_id = id, status = %task.status, "Task status updated");
    Ok(Json(task))
}

async fn get_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let store = state.ingestor.store();
    let id = ConversationId(id);
    let conversation = store
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::from(Error::ConversationNotFound(id.to_string())))?;

    let limit = query
        .messages
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);
    let mut messages = store.recent_messages(&id, limit).await?;
    messages.reverse();

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
    }))
}

async fn context_debug_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<ContextDebugResponse>, ApiError> {
    let store = state.ingestor.store();
    let id = ConversationId(id);
    let conversation = store
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::from(Error::ConversationNotFound(id.to_string())))?;

    let assembled = state
        .ingestor
        .assembler()
        .assemble(store.as_ref(), &conversation)
        .await?;

    Ok(Json(ContextDebugResponse {
        conversation_id: id,
        instructions: assembled
            .segments
            .first()
            .map(|s| s.content.clone())
            .unwrap_or_default(),
        payload: assembled.payload().to_string(),
        metadata: assembled.metadata,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
