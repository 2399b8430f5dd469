//! AnomalyDetector (C9, spec.md §4.9) — z-score evaluation against
//! per-workflow / per-task baselines, rebuilt on a background refresh
//! cadence and atomically swapped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{AnomalyEvent, Baseline, BaselineScope, Severity, TaskExecutionStatus};
use crate::recorder::{ExecutionFilter, ExecutionRecorder};

const DEFAULT_MIN_SAMPLES: u64 = 10;
/// "the most recent N (default 100) successful runs" (§4.9).
pub const DEFAULT_SAMPLE_SIZE: u64 = 100;

/// A successful run's duration, the input to baseline refresh.
#[derive(Debug, Clone, Copy)]
pub struct SampleDuration {
    pub duration_ms: u64,
}

/// Computes `{mean, stddev}` from up to the most recent `sample_size`
/// successful-run durations (§4.9: "from the most recent N (default 100)
/// successful runs"). Callers are expected to have already ordered
/// `recent_successful_durations` newest-first and truncated to the store's
/// notion of "recent".
pub fn compute_baseline(scope: BaselineScope, recent_successful_durations: &[SampleDuration]) -> Baseline {
    let n = recent_successful_durations.len() as u64;
    if n == 0 {
        return Baseline { scope, mean: 0.0, stddev: 0.0, sample_count: 0, refreshed_at: Utc::now() };
    }
    let sum: f64 = recent_successful_durations.iter().map(|s| s.duration_ms as f64).sum();
    let mean = sum / n as f64;
    let variance: f64 = recent_successful_durations
        .iter()
        .map(|s| {
            let d = s.duration_ms as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    Baseline { scope, mean, stddev: variance.max(0.0).sqrt(), sample_count: n, refreshed_at: Utc::now() }
}

/// Holds the current baseline index and evaluates durations against it.
/// The index is replaced wholesale on refresh rather than mutated in
/// place, matching the shared-resource policy of rebuild-then-swap for
/// infrequently-updated, frequently-read state.
#[derive(Clone)]
pub struct AnomalyDetector {
    baselines: Arc<RwLock<HashMap<BaselineScope, Baseline>>>,
    min_samples: u64,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self { baselines: Arc::new(RwLock::new(HashMap::new())), min_samples: DEFAULT_MIN_SAMPLES }
    }

    pub fn with_min_samples(min_samples: u64) -> Self {
        Self { baselines: Arc::new(RwLock::new(HashMap::new())), min_samples }
    }

    /// Atomically swaps in a freshly computed set of baselines.
    pub async fn swap_baselines(&self, fresh: HashMap<BaselineScope, Baseline>) {
        let mut guard = self.baselines.write().await;
        *guard = fresh;
    }

    pub async fn baseline(&self, scope: &BaselineScope) -> Option<Baseline> {
        self.baselines.read().await.get(scope).cloned()
    }

    /// `Evaluate` (§4.9): returns `Some(AnomalyEvent)` iff
    /// `sampleCount >= minSamples`, `stddev > 0`, and `|z| >= 2` (the
    /// lowest severity threshold). Below threshold returns `None`.
    pub async fn evaluate(&self, scope: BaselineScope, execution_id: Uuid, duration_ms: u64) -> Option<AnomalyEvent> {
        let baseline = self.baselines.read().await.get(&scope).cloned()?;
        if baseline.sample_count < self.min_samples || baseline.stddev <= 0.0 {
            return None;
        }
        let z = (duration_ms as f64 - baseline.mean) / baseline.stddev;
        let severity = Severity::from_abs_z(z.abs())?;
        Some(AnomalyEvent {
            scope,
            execution_id,
            duration_ms,
            z_score: z,
            severity,
            detected_at: Utc::now(),
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuilds every `(workflow, task?)` baseline from the `sample_size`
/// most recent successful executions recorded for each named workflow,
/// then swaps them in atomically. Per-task baselines are derived from the
/// same window of records rather than a dedicated per-task query, so a
/// task's sample count tracks however many of its workflow's recent runs
/// actually reached that task.
pub async fn refresh_baselines(
    detector: &AnomalyDetector,
    recorder: &dyn ExecutionRecorder,
    workflow_names: &[String],
    sample_size: u64,
) -> Result<(), crate::error::EngineError> {
    let mut fresh = HashMap::new();

    for name in workflow_names {
        let filter = ExecutionFilter {
            workflow_name: Some(name.clone()),
            status: Some(crate::model::ExecutionStatus::Succeeded),
        };
        let records = recorder
            .list(filter, 0, sample_size)
            .await
            .map_err(|err| crate::error::EngineError::Internal(err.to_string()))?;

        let workflow_scope = BaselineScope::workflow(name);
        let workflow_samples: Vec<SampleDuration> = records
            .iter()
            .filter_map(|record| record.duration.map(|d| SampleDuration { duration_ms: d.as_millis() as u64 }))
            .collect();
        fresh.insert(workflow_scope.clone(), compute_baseline(workflow_scope, &workflow_samples));

        let mut per_task: HashMap<String, Vec<SampleDuration>> = HashMap::new();
        for record in &records {
            for task in &record.task_executions {
                if task.status == TaskExecutionStatus::Succeeded {
                    per_task
                        .entry(task.task_id.clone())
                        .or_default()
                        .push(SampleDuration { duration_ms: task.duration.as_millis() as u64 });
                }
            }
        }
        for (task_id, samples) in per_task {
            let scope = BaselineScope::task(name, &task_id);
            fresh.insert(scope.clone(), compute_baseline(scope, &samples));
        }
    }

    detector.swap_baselines(fresh).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[u64]) -> Vec<SampleDuration> {
        values.iter().map(|&v| SampleDuration { duration_ms: v }).collect()
    }

    #[test]
    fn compute_baseline_matches_known_mean_and_stddev() {
        let baseline = compute_baseline(BaselineScope::workflow("wf"), &samples(&[10, 20, 30]));
        assert!((baseline.mean - 20.0).abs() < 1e-9);
        assert_eq!(baseline.sample_count, 3);
        assert!(baseline.stddev > 0.0);
    }

    #[test]
    fn compute_baseline_of_no_samples_is_zeroed() {
        let baseline = compute_baseline(BaselineScope::workflow("wf"), &[]);
        assert_eq!(baseline.sample_count, 0);
        assert_eq!(baseline.stddev, 0.0);
    }

    #[tokio::test]
    async fn evaluate_below_min_samples_returns_none() {
        let detector = AnomalyDetector::with_min_samples(10);
        let scope = BaselineScope::workflow("wf");
        let mut fresh = HashMap::new();
        fresh.insert(scope.clone(), Baseline { scope: scope.clone(), mean: 100.0, stddev: 10.0, sample_count: 5, refreshed_at: Utc::now() });
        detector.swap_baselines(fresh).await;

        assert!(detector.evaluate(scope, Uuid::new_v4(), 500).await.is_none());
    }

    #[tokio::test]
    async fn evaluate_detects_critical_outlier() {
        let detector = AnomalyDetector::with_min_samples(10);
        let scope = BaselineScope::workflow("wf");
        let mut fresh = HashMap::new();
        fresh.insert(scope.clone(), Baseline { scope: scope.clone(), mean: 100.0, stddev: 10.0, sample_count: 50, refreshed_at: Utc::now() });
        detector.swap_baselines(fresh).await;

        let event = detector.evaluate(scope, Uuid::new_v4(), 160).await.expect("z=6 exceeds threshold");
        assert_eq!(event.severity, Severity::Critical);
        assert!((event.z_score - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn evaluate_within_normal_range_is_none() {
        let detector = AnomalyDetector::with_min_samples(10);
        let scope = BaselineScope::workflow("wf");
        let mut fresh = HashMap::new();
        fresh.insert(scope.clone(), Baseline { scope: scope.clone(), mean: 100.0, stddev: 10.0, sample_count: 50, refreshed_at: Utc::now() });
        detector.swap_baselines(fresh).await;

        assert!(detector.evaluate(scope, Uuid::new_v4(), 105).await.is_none());
    }

    #[tokio::test]
    async fn refresh_baselines_derives_workflow_and_task_scopes_from_recent_successes() {
        use crate::model::{ExecutionRecord, ExecutionStatus, TaskExecutionRecord};
        use crate::recorder::{ExecutionRecorder, InMemoryRecorder};
        use std::time::Duration as StdDuration;

        let recorder = InMemoryRecorder::new();
        for duration_ms in [100u64, 110, 90] {
            let mut record = ExecutionRecord::new(Uuid::new_v4(), "billing", serde_json::json!({}));
            record.task_executions.push(TaskExecutionRecord {
                execution_id: record.id,
                task_id: "charge".into(),
                task_ref: "http:charge".into(),
                status: TaskExecutionStatus::Succeeded,
                output: None,
                errors: Vec::new(),
                error_info: None,
                duration: StdDuration::from_millis(duration_ms),
                retry_count: 0,
                started_at: Utc::now(),
                completed_at: Utc::now(),
            });
            record.finalize(ExecutionStatus::Succeeded);
            recorder.save(&record).await.unwrap();
        }

        let detector = AnomalyDetector::with_min_samples(1);
        refresh_baselines(&detector, &recorder, &["billing".to_string()], DEFAULT_SAMPLE_SIZE).await.unwrap();

        let workflow_baseline = detector.baseline(&BaselineScope::workflow("billing")).await.expect("workflow baseline");
        assert_eq!(workflow_baseline.sample_count, 3);

        let task_baseline = detector.baseline(&BaselineScope::task("billing", "charge")).await.expect("task baseline");
        assert_eq!(task_baseline.sample_count, 3);
        assert!((task_baseline.mean - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn evaluate_with_zero_stddev_never_fires() {
        let detector = AnomalyDetector::with_min_samples(10);
        let scope = BaselineScope::workflow("wf");
        let mut fresh = HashMap::new();
        fresh.insert(scope.clone(), Baseline { scope: scope.clone(), mean: 100.0, stddev: 0.0, sample_count: 50, refreshed_at: Utc::now() });
        detector.swap_baselines(fresh).await;

        assert!(detector.evaluate(scope, Uuid::new_v4(), 9000).await.is_none());
    }
}
