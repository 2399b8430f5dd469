//! ExecutionRecorder persistence (C10, spec.md §4.10, §6.2). Plain
//! repository functions over `PgPool` in the teacher's free-function
//! style, plus a `PgExecutionRecorder` trait-object wrapper the
//! `Orchestrator` is actually constructed with — see DESIGN.md for why the
//! recorder contract is the one exception to "no trait objects" in this
//! workspace.

use async_trait::async_trait;
use chrono::Utc;
use engine::model::{DurationTrendPoint, ExecutionRecord, ExecutionStatus, TaskExecutionRecord};
use engine::recorder::{ExecutionFilter, ExecutionRecorder};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{DurationTrendRow, ExecutionRow, TaskAverageDurationRow, TaskExecutionRow, WorkflowStatisticsRow},
    DbError,
};

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Succeeded => "succeeded",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

/// Idempotent upsert (§6.2: "Idempotent upsert semantics on Save"). The
/// orchestrator only ever calls this once, after an execution finalizes,
/// but a retried call (e.g. after a transient connection error) must not
/// duplicate rows.
pub async fn save_execution(pool: &PgPool, record: &ExecutionRecord) -> Result<(), DbError> {
    let record_json = serde_json::to_value(record).map_err(|err| DbError::Serialization(err.to_string()))?;
    let duration_ms = record.duration.map(|d| d.as_millis() as i64);

    let mut tx = pool.begin().await?;

    sqlx::query!(
        r#"
        INSERT INTO executions (id, workflow_name, status, started_at, completed_at, duration_ms, record)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                completed_at = EXCLUDED.completed_at,
                duration_ms = EXCLUDED.duration_ms,
                record = EXCLUDED.record
        "#,
        record.id,
        record.workflow_name,
        status_str(record.status),
        record.started_at,
        record.completed_at,
        duration_ms,
        record_json,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!("DELETE FROM task_executions WHERE execution_id = $1", record.id).execute(&mut *tx).await?;

    for task in &record.task_executions {
        let task_json = serde_json::to_value(task).map_err(|err| DbError::Serialization(err.to_string()))?;
        sqlx::query!(
            r#"
            INSERT INTO task_executions
                (id, execution_id, task_id, task_ref, status, duration_ms, started_at, completed_at, record)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            Uuid::new_v4(),
            record.id,
            task.task_id,
            task.task_ref,
            match task.status {
                engine::model::TaskExecutionStatus::Succeeded => "succeeded",
                engine::model::TaskExecutionStatus::Failed => "failed",
                engine::model::TaskExecutionStatus::Skipped => "skipped",
            },
            task.duration.as_millis() as i64,
            task.started_at,
            task.completed_at,
            task_json,
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRecord>, DbError> {
    let row = sqlx::query_as!(
        ExecutionRow,
        r#"SELECT id, workflow_name, status, started_at, completed_at, duration_ms, record FROM executions WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?;

    row.map(|row| serde_json::from_value(row.record).map_err(|err| DbError::Serialization(err.to_string())))
        .transpose()
}

pub async fn list_executions(
    pool: &PgPool,
    filter: &ExecutionFilter,
    skip: u64,
    take: u64,
) -> Result<Vec<ExecutionRecord>, DbError> {
    let status = filter.status.map(status_str);
    let rows = sqlx::query_as!(
        ExecutionRow,
        r#"
        SELECT id, workflow_name, status, started_at, completed_at, duration_ms, record
        FROM executions
        WHERE ($1::text IS NULL OR workflow_name = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY started_at DESC
        OFFSET $3
        LIMIT $4
        "#,
        filter.workflow_name,
        status,
        skip as i64,
        take as i64,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| serde_json::from_value(row.record).map_err(|err| DbError::Serialization(err.to_string())))
        .collect()
}

pub async fn task_executions(pool: &PgPool, task_ref: &str, skip: u64, take: u64) -> Result<Vec<TaskExecutionRecord>, DbError> {
    let rows = sqlx::query_as!(
        TaskExecutionRow,
        r#"
        SELECT id, execution_id, task_id, task_ref, status, duration_ms, started_at, completed_at, record
        FROM task_executions
        WHERE task_ref = $1
        ORDER BY started_at DESC
        OFFSET $2
        LIMIT $3
        "#,
        task_ref,
        skip as i64,
        take as i64,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| serde_json::from_value(row.record).map_err(|err| DbError::Serialization(err.to_string())))
        .collect()
}

/// `DurationTrends(entity, daysBack)` (§4.10): daily rollup for the
/// workflow named `entity`, bounded `1 <= daysBack <= 90`.
pub async fn duration_trends(pool: &PgPool, entity: &str, days_back: u32) -> Result<Vec<DurationTrendPoint>, DbError> {
    if !(1..=90).contains(&days_back) {
        return Err(DbError::InvalidArgument(format!("daysBack must be within 1..=90, got {days_back}")));
    }
    let since = Utc::now() - chrono::Duration::days(days_back as i64);

    let rows = sqlx::query_as!(
        DurationTrendRow,
        r#"
        SELECT
            DATE(started_at) AS "date!",
            AVG(duration_ms)::float8 AS "avg_ms!",
            MIN(duration_ms) AS "min_ms!",
            MAX(duration_ms) AS "max_ms!",
            PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY duration_ms) AS "p50_ms!",
            PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY duration_ms) AS "p95_ms!",
            COUNT(*) AS "count!",
            COUNT(*) FILTER (WHERE status = 'succeeded') AS "success!",
            COUNT(*) FILTER (WHERE status = 'failed') AS "failure!"
        FROM executions
        WHERE workflow_name = $1 AND started_at >= $2 AND duration_ms IS NOT NULL
        GROUP BY DATE(started_at)
        ORDER BY DATE(started_at)
        "#,
        entity,
        since,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DurationTrendPoint {
            date: row.date,
            avg_ms: row.avg_ms,
            min_ms: row.min_ms as u64,
            max_ms: row.max_ms as u64,
            p50_ms: row.p50_ms,
            p95_ms: row.p95_ms,
            count: row.count as u64,
            success: row.success as u64,
            failure: row.failure as u64,
        })
        .collect())
}

/// `GetAllWorkflowStatistics()` (§6.2).
pub async fn workflow_statistics(pool: &PgPool) -> Result<Vec<WorkflowStatisticsRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowStatisticsRow,
        r#"
        SELECT
            workflow_name AS "workflow_name!",
            COUNT(*) AS "total_runs!",
            COUNT(*) FILTER (WHERE status = 'succeeded') AS "succeeded!",
            COUNT(*) FILTER (WHERE status = 'failed') AS "failed!",
            COALESCE(AVG(duration_ms), 0)::float8 AS "avg_duration_ms!",
            MAX(started_at) AS last_run_at
        FROM executions
        GROUP BY workflow_name
        ORDER BY workflow_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `GetAverageTaskDurations(workflow, daysBack)` (§6.2).
pub async fn average_task_durations(pool: &PgPool, workflow: &str, days_back: u32) -> Result<Vec<TaskAverageDurationRow>, DbError> {
    if !(1..=90).contains(&days_back) {
        return Err(DbError::InvalidArgument(format!("daysBack must be within 1..=90, got {days_back}")));
    }
    let since = Utc::now() - chrono::Duration::days(days_back as i64);

    let rows = sqlx::query_as!(
        TaskAverageDurationRow,
        r#"
        SELECT
            te.task_ref AS "task_ref!",
            AVG(te.duration_ms)::float8 AS "avg_duration_ms!",
            COUNT(*) AS "run_count!"
        FROM task_executions te
        JOIN executions e ON e.id = te.execution_id
        WHERE e.workflow_name = $1 AND te.started_at >= $2
        GROUP BY te.task_ref
        ORDER BY te.task_ref
        "#,
        workflow,
        since,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `ExecutionRecorder` trait-object wrapper so the `Orchestrator` can be
/// constructed against Postgres without `engine` knowing `sqlx` exists.
pub struct PgExecutionRecorder {
    pool: PgPool,
}

impl PgExecutionRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRecorder for PgExecutionRecorder {
    async fn save(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        save_execution(&self.pool, record).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ExecutionRecord>> {
        Ok(get_execution(&self.pool, id).await?)
    }

    async fn list(&self, filter: ExecutionFilter, skip: u64, take: u64) -> anyhow::Result<Vec<ExecutionRecord>> {
        Ok(list_executions(&self.pool, &filter, skip, take).await?)
    }

    async fn task_executions(&self, task_ref: &str, skip: u64, take: u64) -> anyhow::Result<Vec<TaskExecutionRecord>> {
        Ok(task_executions(&self.pool, task_ref, skip, take).await?)
    }

    async fn duration_trends(&self, entity: &str, days_back: u32) -> anyhow::Result<Vec<DurationTrendPoint>> {
        Ok(duration_trends(&self.pool, entity, days_back).await?)
    }
}
