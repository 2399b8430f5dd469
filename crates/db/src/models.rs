//! Row structs that map onto database tables.
//!
//! Domain types (`WorkflowSpec`, `ExecutionRecord`, ...) live in `engine`;
//! these are the persistence shapes built around them — some columns exist
//! purely to let the repository layer filter/sort/aggregate without
//! deserializing every row's full JSONB blob.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows — backs the optional Postgres CatalogSource (§4.1/§6.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub namespace: Option<String>,
    /// The full `engine::model::WorkflowSpec`, serialized.
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task resource registered under a `taskRef` name (§3: `TaskResource` is
/// itself an unnamed `{kind, ...}` leaf — the catalog's keys are the
/// identity).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskResourceRow {
    pub id: Uuid,
    pub task_ref: String,
    pub namespace: Option<String>,
    /// The full `engine::model::TaskResource`, serialized.
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// executions — backs ExecutionRecorder (§4.10, §6.2)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// The full `engine::model::ExecutionRecord`, serialized — `get`/`list`
    /// answer straight out of this column.
    pub record: serde_json::Value,
}

/// One task's run, denormalized out of its parent `ExecutionRow.record` so
/// `TaskExecutions(taskRef, skip, take)` (§4.10) doesn't have to scan and
/// deserialize every execution ever recorded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskExecutionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub task_id: String,
    pub task_ref: String,
    pub status: String,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// The full `engine::model::TaskExecutionRecord`, serialized.
    pub record: serde_json::Value,
}

/// One daily point of a `DurationTrends` rollup (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DurationTrendRow {
    pub date: NaiveDate,
    pub avg_ms: f64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub count: i64,
    pub success: i64,
    pub failure: i64,
}

/// `GetAllWorkflowStatistics()` (§6.2) — one row per workflow name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStatisticsRow {
    pub workflow_name: String,
    pub total_runs: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// `GetAverageTaskDurations(workflow, daysBack)` (§6.2) — one row per
/// `taskRef` used within `workflow` in the lookback window.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskAverageDurationRow {
    pub task_ref: String,
    pub avg_duration_ms: f64,
    pub run_count: i64,
}

// ---------------------------------------------------------------------------
// secrets
// ---------------------------------------------------------------------------

/// A named credential a `WebhookTrigger.secretRef` resolves to. At-rest
/// encryption is left to the database/volume layer rather than this
/// application — see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretRow {
    pub secret_ref: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}
