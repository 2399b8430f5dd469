//! Execution records and their incremental statistics (spec.md §3, §4.4).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskExecutionStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// The taxonomy of error kinds the engine distinguishes (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InputValidation,
    GraphBuild,
    TemplateResolution,
    TaskTimeout,
    TransportError,
    HttpStatus,
    MalformedResponse,
    SubworkflowCycle,
    SubworkflowDepth,
    Cancelled,
    PersistenceFailure,
    NotifierFailure,
}

/// Structured detail captured on task failure (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub task_id: String,
    #[serde(default)]
    pub task_name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub http_status: Option<u16>,
    /// Truncated to 1 KiB.
    #[serde(default)]
    pub response_body_preview: Option<String>,
    pub retry_attempts: u32,
    pub is_retryable: bool,
    pub occurred_at: DateTime<Utc>,
    pub duration_until_error_ms: u64,
    #[serde(default)]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub execution_id: Uuid,
    pub task_id: String,
    pub task_ref: String,
    pub status: TaskExecutionStatus,
    #[serde(default)]
    pub output: Option<Json>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub error_info: Option<ErrorDetail>,
    pub duration: Duration,
    pub retry_count: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Engine-internal timing breakdown for one execution (§4.4, §GLOSSARY).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationCost {
    pub graph_build: Duration,
    pub teardown: Duration,
    pub scheduling_overhead: Duration,
    pub level_durations: Vec<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<Duration>,
    pub input_snapshot: Json,
    pub task_executions: Vec<TaskExecutionRecord>,
    #[serde(default)]
    pub graph_build_duration: Option<Duration>,
    #[serde(default)]
    pub orchestration_cost: Option<OrchestrationCost>,
}

impl ExecutionRecord {
    pub fn new(id: Uuid, workflow_name: impl Into<String>, input_snapshot: Json) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            input_snapshot,
            task_executions: Vec::new(),
            graph_build_duration: None,
            orchestration_cost: None,
        }
    }

    /// Finalize the record exactly once; subsequent calls are a no-op since
    /// the Orchestrator only ever calls this on the final exit path.
    pub fn finalize(&mut self, status: ExecutionStatus) {
        if self.completed_at.is_some() {
            return;
        }
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration = Some((now - self.started_at).to_std().unwrap_or_default());
        self.status = status;
    }
}

/// A daily rollup point returned by `DurationTrends` (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationTrendPoint {
    pub date: chrono::NaiveDate,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub count: u64,
    pub success: u64,
    pub failure: u64,
}
