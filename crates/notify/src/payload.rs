//! Wire shape of the events fanned out by [`crate::hub::NotifyHub`]. One flat,
//! tagged enum rather than five unrelated structs, since every subscriber —
//! the per-execution SSE stream and the global `visualization` group alike —
//! consumes the same stream and switches on `type`.

use chrono::{DateTime, Utc};
use engine::model::{AnomalyEvent, ExecutionStatus, TaskExecutionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    WorkflowStarted {
        execution_id: Uuid,
        workflow_name: String,
        at: DateTime<Utc>,
    },
    TaskStarted {
        execution_id: Uuid,
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        execution_id: Uuid,
        task_id: String,
        status: TaskExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Json>,
        at: DateTime<Utc>,
    },
    SignalFlow {
        execution_id: Uuid,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: Uuid,
        workflow_name: String,
        status: ExecutionStatus,
        at: DateTime<Utc>,
    },
    AnomalyDetected {
        #[serde(flatten)]
        event: AnomalyEvent,
    },
}

impl Event {
    /// The execution a subscriber on the `exec-<uuid>` group would filter on.
    /// `AnomalyDetected` has no execution scope of its own in the
    /// `visualization` sense other than the one it references, so it is
    /// routed there too.
    pub fn execution_id(&self) -> Uuid {
        match self {
            Event::WorkflowStarted { execution_id, .. }
            | Event::TaskStarted { execution_id, .. }
            | Event::TaskCompleted { execution_id, .. }
            | Event::SignalFlow { execution_id, .. }
            | Event::WorkflowCompleted { execution_id, .. } => *execution_id,
            Event::AnomalyDetected { event } => event.execution_id,
        }
    }
}
