//! ExecutionRecorder contract (C10, spec.md §4.10, §6.2). Kept as a trait
//! object here (rather than the teacher's free-function-over-`PgPool`
//! style used elsewhere in the workspace) specifically so the orchestrator
//! can be exercised in tests against an in-memory recorder — see
//! DESIGN.md for the reconciliation with the teacher's persistence style.

use async_trait::async_trait;

use crate::model::{DurationTrendPoint, ExecutionRecord, ExecutionStatus};

#[derive(Debug, Clone)]
pub struct ExecutionFilter {
    pub workflow_name: Option<String>,
    pub status: Option<ExecutionStatus>,
}

/// Persists `ExecutionRecord`s and answers the history/trend queries the
/// engine needs. Per §4.10, a failing `save` must never fail the execution
/// it is recording — callers are expected to log and continue.
#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    async fn save(&self, record: &ExecutionRecord) -> anyhow::Result<()>;
    async fn get(&self, id: uuid::Uuid) -> anyhow::Result<Option<ExecutionRecord>>;
    async fn list(&self, filter: ExecutionFilter, skip: u64, take: u64) -> anyhow::Result<Vec<ExecutionRecord>>;
    async fn task_executions(&self, task_ref: &str, skip: u64, take: u64) -> anyhow::Result<Vec<crate::model::TaskExecutionRecord>>;
    async fn duration_trends(&self, entity: &str, days_back: u32) -> anyhow::Result<Vec<DurationTrendPoint>>;
}

/// An in-memory recorder for tests and the `cli validate` / demo paths.
#[derive(Default)]
pub struct InMemoryRecorder {
    records: tokio::sync::RwLock<std::collections::HashMap<uuid::Uuid, ExecutionRecord>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRecorder for InMemoryRecorder {
    async fn save(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: uuid::Uuid) -> anyhow::Result<Option<ExecutionRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: ExecutionFilter, skip: u64, take: u64) -> anyhow::Result<Vec<ExecutionRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<ExecutionRecord> = records
            .values()
            .filter(|r| filter.workflow_name.as_deref().map_or(true, |n| r.workflow_name == n))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matched.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(matched.into_iter().skip(skip as usize).take(take as usize).collect())
    }

    async fn task_executions(&self, task_ref: &str, skip: u64, take: u64) -> anyhow::Result<Vec<crate::model::TaskExecutionRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<crate::model::TaskExecutionRecord> = records
            .values()
            .flat_map(|r| r.task_executions.iter().cloned())
            .filter(|t| t.task_ref == task_ref)
            .collect();
        matched.sort_by_key(|t| std::cmp::Reverse(t.started_at));
        Ok(matched.into_iter().skip(skip as usize).take(take as usize).collect())
    }

    async fn duration_trends(&self, _entity: &str, days_back: u32) -> anyhow::Result<Vec<DurationTrendPoint>> {
        if !(1..=90).contains(&days_back) {
            anyhow::bail!("daysBack must be within 1..=90, got {days_back}");
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duration_trends_rejects_out_of_range_days_back() {
        let recorder = InMemoryRecorder::new();
        assert!(recorder.duration_trends("wf", 0).await.is_err());
        assert!(recorder.duration_trends("wf", 91).await.is_err());
        assert!(recorder.duration_trends("wf", 1).await.is_ok());
        assert!(recorder.duration_trends("wf", 90).await.is_ok());
    }
}
