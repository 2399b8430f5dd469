//! StatsAggregator (C8, spec.md §4.8) — delta-based O(1) rollups of
//! workflow/task counts and durations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::model::DurationTrendPoint;

/// Running aggregate for one workflow or one `(workflow, task)` pair.
/// `sum_sq_duration_ms` is kept for O(1) variance: `var = sum_sq/n -
/// (sum/n)^2`.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub sum_duration_ms: u128,
    pub sum_sq_duration_ms: u128,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub last_at: Option<DateTime<Utc>>,
}

impl RunningStats {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_duration_ms as f64 / self.count as f64
        }
    }

    /// Population stddev from the O(1) sum/sum-of-squares accumulators.
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.mean();
        let variance = (self.sum_sq_duration_ms as f64 / n) - mean * mean;
        variance.max(0.0).sqrt()
    }

    fn record(&mut self, duration_ms: u64, succeeded: bool, at: DateTime<Utc>) {
        self.count += 1;
        if succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.sum_duration_ms += duration_ms as u128;
        self.sum_sq_duration_ms += (duration_ms as u128) * (duration_ms as u128);
        self.min_duration_ms = Some(self.min_duration_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        self.max_duration_ms = Some(self.max_duration_ms.map_or(duration_ms, |m| m.max(duration_ms)));
        self.last_at = Some(at);
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ScopeKey {
    workflow_name: String,
    task_id: Option<String>,
}

/// Holds per-workflow and per-task running aggregates behind a single
/// `RwLock`, matching the shared-resource policy of keeping hot-path
/// update contention low via O(1) mutation rather than full recomputation.
#[derive(Clone)]
pub struct StatsAggregator {
    scopes: Arc<RwLock<HashMap<ScopeKey, RunningStats>>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self { scopes: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Records one completed task or workflow execution. Never fails the
    /// caller — per §4.8 "Updates are non-critical" this never returns an
    /// error to propagate; any future fallible sink is logged internally.
    pub async fn record(&self, workflow_name: &str, task_id: Option<&str>, duration_ms: u64, succeeded: bool) {
        self.record_at(workflow_name, task_id, duration_ms, succeeded, Utc::now()).await;
    }

    pub async fn record_at(
        &self,
        workflow_name: &str,
        task_id: Option<&str>,
        duration_ms: u64,
        succeeded: bool,
        at: DateTime<Utc>,
    ) {
        let key = ScopeKey { workflow_name: workflow_name.to_string(), task_id: task_id.map(str::to_string) };
        let mut scopes = self.scopes.write().await;
        scopes.entry(key).or_default().record(duration_ms, succeeded, at);
    }

    pub async fn workflow_stats(&self, workflow_name: &str) -> Option<RunningStats> {
        let scopes = self.scopes.read().await;
        scopes.get(&ScopeKey { workflow_name: workflow_name.to_string(), task_id: None }).cloned()
    }

    pub async fn task_stats(&self, workflow_name: &str, task_id: &str) -> Option<RunningStats> {
        let scopes = self.scopes.read().await;
        scopes
            .get(&ScopeKey { workflow_name: workflow_name.to_string(), task_id: Some(task_id.to_string()) })
            .cloned()
    }
}

pub enum Percentile {
    P50,
    P95,
    /// No dedicated daily column exists for P99; approximated from the P95
    /// column, the closest stored rollup (§4.8: "approximated... using
    /// stored daily rollups").
    P99,
}

/// Approximates a percentile across a span of days by averaging each day's
/// stored percentile column, weighted by that day's execution count
/// (§4.8: "approximated per day using stored daily rollups weighted by
/// execution count").
pub fn weighted_percentile(points: &[DurationTrendPoint], which: Percentile) -> Option<f64> {
    let total_count: u64 = points.iter().map(|p| p.count).sum();
    if total_count == 0 {
        return None;
    }
    let weighted_sum: f64 = points
        .iter()
        .map(|p| {
            let value = match which {
                Percentile::P50 => p.p50_ms,
                Percentile::P95 | Percentile::P99 => p.p95_ms,
            };
            value * p.count as f64
        })
        .sum();
    Some(weighted_sum / total_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_accumulate_count_and_duration() {
        let stats = StatsAggregator::new();
        stats.record("wf", None, 100, true).await;
        stats.record("wf", None, 200, true).await;
        stats.record("wf", None, 50, false).await;

        let snapshot = stats.workflow_stats("wf").await.unwrap();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.success_count, 2);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.min_duration_ms, Some(50));
        assert_eq!(snapshot.max_duration_ms, Some(200));
        assert!((snapshot.mean() - (350.0 / 3.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn workflow_and_task_scopes_are_independent() {
        let stats = StatsAggregator::new();
        stats.record("wf", None, 100, true).await;
        stats.record("wf", Some("fetch"), 40, true).await;

        assert_eq!(stats.workflow_stats("wf").await.unwrap().count, 1);
        assert_eq!(stats.task_stats("wf", "fetch").await.unwrap().count, 1);
        assert!(stats.task_stats("wf", "missing").await.is_none());
    }

    #[tokio::test]
    async fn stddev_is_zero_for_constant_durations() {
        let stats = StatsAggregator::new();
        for _ in 0..5 {
            stats.record("wf", None, 100, true).await;
        }
        let snapshot = stats.workflow_stats("wf").await.unwrap();
        assert!(snapshot.stddev() < 1e-9);
    }

    #[test]
    fn weighted_percentile_is_count_weighted_average() {
        let points = vec![
            DurationTrendPoint {
                date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                avg_ms: 100.0,
                min_ms: 50,
                max_ms: 150,
                p50_ms: 100.0,
                p95_ms: 140.0,
                count: 3,
                success: 3,
                failure: 0,
            },
            DurationTrendPoint {
                date: chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                avg_ms: 200.0,
                min_ms: 150,
                max_ms: 250,
                p50_ms: 200.0,
                p95_ms: 240.0,
                count: 1,
                success: 1,
                failure: 0,
            },
        ];
        let p50 = weighted_percentile(&points, Percentile::P50).unwrap();
        assert!((p50 - 125.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_percentile_of_empty_points_is_none() {
        assert!(weighted_percentile(&[], Percentile::P95).is_none());
    }
}
