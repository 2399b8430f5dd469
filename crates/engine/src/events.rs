//! EventNotifier contract (C7, spec.md §4.7). `engine` only depends on this
//! trait; the `notify` crate supplies the fan-out implementation so the
//! orchestrator never has to know how (or whether) anyone is listening.
//!
//! Every method is best-effort: implementations must swallow their own
//! delivery failures (log and drop) rather than return an error, since §4.7
//! and §7 both require that notifier failures never bubble into the
//! orchestrator.

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::model::{AnomalyEvent, ExecutionStatus, TaskExecutionStatus};

/// Fan-out target for workflow/task lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn workflow_started(&self, execution_id: Uuid, workflow_name: &str);
    async fn task_started(&self, execution_id: Uuid, task_id: &str);
    async fn task_completed(&self, execution_id: Uuid, task_id: &str, status: TaskExecutionStatus, output: Option<&Json>);
    async fn signal_flow(&self, execution_id: Uuid, from: &str, to: &str);
    async fn workflow_completed(&self, execution_id: Uuid, workflow_name: &str, status: ExecutionStatus);
    /// Forwarded from the `AnomalyDetector` on detection (§4.9: "forwards to
    /// EventNotifier; notifier errors do not suppress the returned event").
    async fn anomaly_detected(&self, event: &AnomalyEvent);
}

/// A sink that discards every event — the default when no transport is
/// wired up (unit tests, `cli validate`).
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn workflow_started(&self, _execution_id: Uuid, _workflow_name: &str) {}
    async fn task_started(&self, _execution_id: Uuid, _task_id: &str) {}
    async fn task_completed(&self, _execution_id: Uuid, _task_id: &str, _status: TaskExecutionStatus, _output: Option<&Json>) {}
    async fn signal_flow(&self, _execution_id: Uuid, _from: &str, _to: &str) {}
    async fn workflow_completed(&self, _execution_id: Uuid, _workflow_name: &str, _status: ExecutionStatus) {}
    async fn anomaly_detected(&self, _event: &AnomalyEvent) {}
}
