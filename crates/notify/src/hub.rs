//! `NotifyHub` — the EventNotifier (C7, spec.md §4.7). Every lifecycle call
//! fans the event out to two groups concurrently: the per-execution group
//! `exec-<uuid>` (created on `workflow_started`, torn down once
//! `workflow_completed` has been delivered) and the global `visualization`
//! group. Delivery is best-effort: a lagging or absent subscriber never
//! slows or fails the caller — `tokio::sync::broadcast` itself drops the
//! oldest buffered event once a receiver falls behind capacity, and we
//! swallow the `SendError` that fires when a group has no subscribers at
//! all (§4.7: "notifier failures must not bubble into the Orchestrator").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use engine::events::EventSink;
use engine::model::{AnomalyEvent, ExecutionStatus, TaskExecutionStatus};
use serde_json::Value as Json;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::payload::Event;

/// Bounded per §9's "drop the oldest if a subscriber is slow" backpressure
/// policy.
const CHANNEL_CAPACITY: usize = 256;

struct Inner {
    visualization: broadcast::Sender<Event>,
    executions: RwLock<HashMap<Uuid, broadcast::Sender<Event>>>,
}

/// Cheap to clone (`Arc` around the shared registry) — shared across the
/// `api` router state and the `Orchestrator`'s `EventSink`.
#[derive(Clone)]
pub struct NotifyHub {
    inner: Arc<Inner>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        let (visualization, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                visualization,
                executions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the global `visualization` group.
    pub fn subscribe_visualization(&self) -> broadcast::Receiver<Event> {
        self.inner.visualization.subscribe()
    }

    /// Subscribe to one execution's group. Returns `None` if the execution
    /// hasn't started (or has already completed and been torn down) — a
    /// caller streaming against a stale or unknown id should see this as
    /// "nothing more will ever arrive," not as an error.
    pub async fn subscribe_execution(&self, execution_id: Uuid) -> Option<broadcast::Receiver<Event>> {
        self.inner.executions.read().await.get(&execution_id).map(|tx| tx.subscribe())
    }

    async fn group_sender(&self, execution_id: Uuid) -> broadcast::Sender<Event> {
        if let Some(tx) = self.inner.executions.read().await.get(&execution_id) {
            return tx.clone();
        }
        let mut groups = self.inner.executions.write().await;
        groups
            .entry(execution_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    async fn publish(&self, event: Event) {
        let execution_id = event.execution_id();
        let group = self.group_sender(execution_id).await;
        // `send` only errors when there are zero receivers; both groups are
        // allowed to be empty (no one is watching yet) so this is expected,
        // not a failure to log.
        let _ = group.send(event.clone());
        let _ = self.inner.visualization.send(event);
    }

    async fn teardown_execution(&self, execution_id: Uuid) {
        self.inner.executions.write().await.remove(&execution_id);
        debug!(%execution_id, "torn down execution notification group");
    }
}

#[async_trait]
impl EventSink for NotifyHub {
    async fn workflow_started(&self, execution_id: Uuid, workflow_name: &str) {
        self.publish(Event::WorkflowStarted {
            execution_id,
            workflow_name: workflow_name.to_string(),
            at: chrono::Utc::now(),
        })
        .await;
    }

    async fn task_started(&self, execution_id: Uuid, task_id: &str) {
        self.publish(Event::TaskStarted { execution_id, task_id: task_id.to_string(), at: chrono::Utc::now() }).await;
    }

    async fn task_completed(&self, execution_id: Uuid, task_id: &str, status: TaskExecutionStatus, output: Option<&Json>) {
        self.publish(Event::TaskCompleted {
            execution_id,
            task_id: task_id.to_string(),
            status,
            output: output.cloned(),
            at: chrono::Utc::now(),
        })
        .await;
    }

    async fn signal_flow(&self, execution_id: Uuid, from: &str, to: &str) {
        self.publish(Event::SignalFlow { execution_id, from: from.to_string(), to: to.to_string(), at: chrono::Utc::now() })
            .await;
    }

    async fn workflow_completed(&self, execution_id: Uuid, workflow_name: &str, status: ExecutionStatus) {
        self.publish(Event::WorkflowCompleted {
            execution_id,
            workflow_name: workflow_name.to_string(),
            status,
            at: chrono::Utc::now(),
        })
        .await;
        self.teardown_execution(execution_id).await;
    }

    async fn anomaly_detected(&self, event: &AnomalyEvent) {
        self.publish(Event::AnomalyDetected { event: event.clone() }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::model::{BaselineScope, Severity};

    #[tokio::test]
    async fn workflow_started_creates_a_subscribable_execution_group() {
        let hub = NotifyHub::new();
        let execution_id = Uuid::new_v4();
        hub.workflow_started(execution_id, "demo").await;

        let mut rx = hub.subscribe_execution(execution_id).await.expect("group should exist");
        hub.task_started(execution_id, "t1").await;
        match rx.recv().await.unwrap() {
            Event::TaskStarted { task_id, .. } => assert_eq!(task_id, "t1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn workflow_completed_tears_down_the_execution_group() {
        let hub = NotifyHub::new();
        let execution_id = Uuid::new_v4();
        hub.workflow_started(execution_id, "demo").await;
        hub.workflow_completed(execution_id, "demo", ExecutionStatus::Succeeded).await;

        assert!(hub.subscribe_execution(execution_id).await.is_none());
    }

    #[tokio::test]
    async fn events_reach_the_visualization_group_regardless_of_execution_subscribers() {
        let hub = NotifyHub::new();
        let mut viz = hub.subscribe_visualization();
        let execution_id = Uuid::new_v4();

        hub.workflow_started(execution_id, "demo").await;
        match viz.recv().await.unwrap() {
            Event::WorkflowStarted { workflow_name, .. } => assert_eq!(workflow_name, "demo"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_error() {
        let hub = NotifyHub::new();
        hub.anomaly_detected(&AnomalyEvent {
            scope: BaselineScope::workflow("demo"),
            execution_id: Uuid::new_v4(),
            duration_ms: 9000,
            z_score: 4.2,
            severity: Severity::Critical,
            detected_at: chrono::Utc::now(),
        })
        .await;
    }
}
