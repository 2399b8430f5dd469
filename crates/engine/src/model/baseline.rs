//! Anomaly-detection baselines (spec.md §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a baseline is scoped to: a whole workflow, or one task within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaselineScope {
    pub workflow_name: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl BaselineScope {
    pub fn workflow(name: impl Into<String>) -> Self {
        Self { workflow_name: name.into(), task_id: None }
    }

    pub fn task(name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self { workflow_name: name.into(), task_id: Some(task_id.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub scope: BaselineScope,
    pub mean: f64,
    pub stddev: f64,
    pub sample_count: u64,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Minor [2,3), Major [3,4), Critical >=4 (§4.9).
    pub fn from_abs_z(abs_z: f64) -> Option<Severity> {
        if abs_z >= 4.0 {
            Some(Severity::Critical)
        } else if abs_z >= 3.0 {
            Some(Severity::Major)
        } else if abs_z >= 2.0 {
            Some(Severity::Minor)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub scope: BaselineScope,
    pub execution_id: Uuid,
    pub duration_ms: u64,
    pub z_score: f64,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_buckets_match_spec_thresholds() {
        assert_eq!(Severity::from_abs_z(1.9), None);
        assert_eq!(Severity::from_abs_z(2.0), Some(Severity::Minor));
        assert_eq!(Severity::from_abs_z(2.99), Some(Severity::Minor));
        assert_eq!(Severity::from_abs_z(3.0), Some(Severity::Major));
        assert_eq!(Severity::from_abs_z(3.99), Some(Severity::Major));
        assert_eq!(Severity::from_abs_z(4.0), Some(Severity::Critical));
        assert_eq!(Severity::from_abs_z(10.0), Some(Severity::Critical));
    }
}
