//! HTTP front door for the kernel proxy.
//!
//! Thin request-handling layer over the session registry and execution
//! tracker. Submitting code returns an execution id immediately; the
//! result is observed by polling `GET /executions/{id}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use kernel_proxy_core::{
    Execution, ExecutionError, ExecutionStatus, SessionError, TransportError, WireMessage,
    traits::{ChannelConnector, KernelLifecycle},
};
use kernel_proxy_session::SessionRegistry;

/// Build the front-door router over a registry.
pub fn router<L, C>(registry: Arc<SessionRegistry<L, C>>) -> Router
where
    L: KernelLifecycle + 'static,
    C: ChannelConnector + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/start_kernel", post(start_kernel::<L, C>))
        .route("/execute_code", post(execute_code::<L, C>))
        .route("/executions/{execution_id}", get(execution_status::<L, C>))
        .route("/shutdown_kernel", post(shutdown_kernel::<L, C>))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteCodeRequest {
    /// Session (kernel) identifier.
    pub id: String,
    /// Code to execute.
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ShutdownKernelRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct StartKernelResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct ExecuteCodeResponse {
    execution_id: Uuid,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

/// Poll view of one execution.
#[derive(Debug, Serialize)]
struct ExecutionView {
    execution_id: Uuid,
    session_id: String,
    status: ExecutionStatus,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    output: Vec<WireMessage>,
    error: Option<ExecutionError>,
}

impl From<Execution> for ExecutionView {
    fn from(execution: Execution) -> Self {
        Self {
            execution_id: execution.id,
            session_id: execution.session_id,
            status: execution.status,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            output: execution.buffered_output,
            error: execution.error,
        }
    }
}

/// Error response carrier for every handler.
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    Transport(TransportError),
    ExecutionNotFound(Uuid),
    EmptyCode,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionError::NotFound(_)) | Self::ExecutionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Session(SessionError::Busy | SessionError::Shutdown) => StatusCode::CONFLICT,
            Self::Session(SessionError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::EmptyCode => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Session(e) => e.to_string(),
            Self::Transport(e) => e.to_string(),
            Self::ExecutionNotFound(id) => format!("execution not found: {id}"),
            Self::EmptyCode => "code cannot be empty or whitespace only".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn start_kernel<L, C>(
    State(registry): State<Arc<SessionRegistry<L, C>>>,
) -> Result<Json<StartKernelResponse>, ApiError>
where
    L: KernelLifecycle + 'static,
    C: ChannelConnector + 'static,
{
    let id = registry.create_session().await?;
    Ok(Json(StartKernelResponse { id }))
}

async fn execute_code<L, C>(
    State(registry): State<Arc<SessionRegistry<L, C>>>,
    Json(request): Json<ExecuteCodeRequest>,
) -> Result<Json<ExecuteCodeResponse>, ApiError>
where
    L: KernelLifecycle + 'static,
    C: ChannelConnector + 'static,
{
    if request.code.trim().is_empty() {
        return Err(ApiError::EmptyCode);
    }
    let execution_id = registry.submit(&request.id, &request.code).await?;
    Ok(Json(ExecuteCodeResponse { execution_id }))
}

async fn execution_status<L, C>(
    State(registry): State<Arc<SessionRegistry<L, C>>>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<ExecutionView>, ApiError>
where
    L: KernelLifecycle + 'static,
    C: ChannelConnector + 'static,
{
    registry
        .tracker()
        .status(execution_id)
        .map(|execution| Json(ExecutionView::from(execution)))
        .ok_or(ApiError::ExecutionNotFound(execution_id))
}

async fn shutdown_kernel<L, C>(
    State(registry): State<Arc<SessionRegistry<L, C>>>,
    Json(request): Json<ShutdownKernelRequest>,
) -> Result<Json<MessageResponse>, ApiError>
where
    L: KernelLifecycle + 'static,
    C: ChannelConnector + 'static,
{
    registry.destroy_session(&request.id).await?;
    Ok(Json(MessageResponse {
        message: format!("kernel {} shutdown", request.id),
    }))
}
