//! `Execute`, `BuildTrace`, `ListExecutions`, `ListOptimizations` (§6.3) and
//! the SSE bridge onto the per-execution `notify` group.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use engine::model::{DurationTrendPoint, ExecutionRecord, ExecutionStatus};
use engine::recorder::ExecutionFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub input: Value,
}

#[derive(Serialize)]
pub struct ExecutionResponse {
    pub id: Uuid,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<u128>,
    pub input_snapshot: Value,
    pub task_executions: Vec<engine::model::TaskExecutionRecord>,
    pub output: Option<Value>,
}

impl From<ExecutionRecord> for ExecutionResponse {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            id: record.id,
            workflow_name: record.workflow_name,
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
            duration_ms: record.duration.map(|d| d.as_millis()),
            input_snapshot: record.input_snapshot,
            task_executions: record.task_executions,
            output: None,
        }
    }
}

pub async fn execute(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<ExecutionResponse>), ApiError> {
    let result = state.orchestrator.execute(&name, payload.input, CancellationToken::new()).await?;
    let mut response: ExecutionResponse = result.record.into();
    response.output = Some(result.output);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<ExecutionResponse>, ApiError> {
    let record = state.recorder.get(id).await.map_err(|err| ApiError::internal(err.to_string()))?;
    let record = record.ok_or_else(|| ApiError::not_found(format!("execution '{id}' not found")))?;
    Ok(Json(record.into()))
}

#[derive(Deserialize)]
pub struct ListExecutionsQuery {
    pub workflow: Option<String>,
    pub status: Option<ExecutionStatus>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_take")]
    pub take: u64,
}

fn default_take() -> u64 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<ExecutionResponse>>, ApiError> {
    let filter = ExecutionFilter { workflow_name: query.workflow, status: query.status };
    let records = state
        .recorder
        .list(filter, query.skip, query.take)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(records.into_iter().map(ExecutionResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct OptimizationsQuery {
    #[serde(default = "default_days_back")]
    pub days_back: u32,
}

fn default_days_back() -> u32 {
    30
}

/// Stub surfacing `DurationTrends` in lieu of real optimization analysis,
/// which is explicitly out of scope (§1).
pub async fn optimizations(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<OptimizationsQuery>,
) -> Result<Json<Vec<DurationTrendPoint>>, ApiError> {
    let trends = state
        .recorder
        .duration_trends(&name, query.days_back)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(trends))
}

/// SSE bridge onto the `notify` per-execution broadcast group. Returns
/// `404` for an execution that never started (or already completed and
/// had its group torn down) rather than opening a stream that never emits.
pub async fn stream(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let rx = state
        .notify
        .subscribe_execution(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("execution '{id}' has no active stream")))?;

    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(SseEvent::default().data(json))),
            Err(_) => None,
        },
        // A lagging subscriber missed some events; skip rather than error
        // the whole stream.
        Err(_) => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
