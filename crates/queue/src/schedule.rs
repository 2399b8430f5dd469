//! Cron half of the TriggerLoop (C6, spec.md §4.6, §6.5): a periodic poll
//! that evaluates every workflow's `ScheduleTrigger`s against an in-memory
//! `lastRun` map and fires `Orchestrator::execute` for the ones that are
//! due.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use engine::Orchestrator;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use catalog::CatalogCache;
use engine::model::Trigger;

/// Default poll interval (§SPEC_FULL ambient config: "trigger poll 10s").
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long `run` waits for in-flight dispatches to finish once `shutdown`
/// fires, before abandoning whatever's left (§9 Design Note: "a supervised
/// worker... on shutdown, allow a grace window before hard cancel").
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// `IsDue(expr, lastRun, now)` (§6.5): true iff some fire time `t` exists
/// with `lastRun < t <= now`. The `cron` crate speaks 6-field (seconds
/// first) expressions; a standard 5-field spec.md cron is adapted by
/// pinning seconds to `0`.
pub fn is_due(expr: &str, last_run: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool, cron::error::Error> {
    let schedule = Schedule::from_str(&format!("0 {expr}"))?;
    Ok(schedule.after(&last_run).next().is_some_and(|next| next <= now))
}

/// Periodic cron scheduler. Holds no persisted state — a restart starts
/// every trigger's `lastRun` clock fresh at the loop's first tick rather
/// than firing a catch-up burst for everything missed while the process
/// was down (the queue of pending executions is explicitly not durable
/// across restarts, per the workspace's stated Non-goals).
pub struct ScheduleLoop {
    catalog: Arc<CatalogCache>,
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
    last_run: RwLock<HashMap<(String, String), DateTime<Utc>>>,
    /// Dispatched executions, tracked so `run` can drain them on shutdown
    /// instead of abandoning them as detached tasks.
    in_flight: Mutex<JoinSet<()>>,
}

impl ScheduleLoop {
    pub fn new(catalog: Arc<CatalogCache>, orchestrator: Arc<Orchestrator>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            orchestrator,
            poll_interval,
            last_run: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(JoinSet::new()),
        })
    }

    /// Runs until `shutdown` is cancelled, then waits up to `SHUTDOWN_GRACE`
    /// for any dispatches still in flight before returning.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("schedule loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        let mut in_flight = self.in_flight.lock().await;
        if in_flight.is_empty() {
            return;
        }
        info!(pending = in_flight.len(), "waiting for in-flight scheduled executions to finish");
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(abandoned = in_flight.len(), "shutdown grace window elapsed, abandoning remaining scheduled executions");
            in_flight.shutdown().await;
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        for workflow in self.catalog.list_workflows() {
            for trigger in &workflow.triggers {
                let Trigger::Schedule(schedule) = trigger else { continue };
                if !schedule.enabled {
                    continue;
                }
                let key = (workflow.name.clone(), schedule.id.clone());

                let last_run = {
                    let map = self.last_run.read().await;
                    map.get(&key).copied()
                };
                let Some(last_run) = last_run else {
                    // First time this trigger is observed: baseline its
                    // clock to now rather than firing for everything that
                    // would technically be "due" since the epoch.
                    self.last_run.write().await.insert(key, now);
                    continue;
                };

                match is_due(&schedule.cron, last_run, now) {
                    Ok(true) => {
                        self.last_run.write().await.insert(key, now);
                        self.dispatch(workflow.name.clone(), schedule.input.clone()).await;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(workflow = %workflow.name, trigger = %schedule.id, %err, "invalid cron expression, skipping");
                    }
                }
            }
        }
    }

    async fn dispatch(&self, workflow_name: String, input: serde_json::Value) {
        let orchestrator = self.orchestrator.clone();
        self.in_flight.lock().await.spawn(async move {
            let cancel = CancellationToken::new();
            if let Err(err) = orchestrator.execute(&workflow_name, input, cancel).await {
                warn!(workflow = %workflow_name, %err, "scheduled execution failed to start");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn due_when_a_fire_time_falls_in_the_open_interval() {
        let last_run = Utc.with_ymd_and_hms(2026, 1, 1, 11, 59, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 1, 0).unwrap();
        assert!(is_due("0 12 * * *", last_run, now).unwrap());
    }

    #[test]
    fn not_due_when_no_fire_time_has_elapsed() {
        let last_run = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 30).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap();
        assert!(!is_due("0 12 * * *", last_run, now).unwrap());
    }

    #[test]
    fn invalid_expression_is_an_error_not_a_panic() {
        assert!(is_due("not a cron", Utc::now(), Utc::now()).is_err());
    }
}
