//! Baseline refresh loop backing `cli anomaly-baseline-refresh` (SPEC_FULL
//! §"ambient: CLI surface"). Periodically rebuilds `AnomalyDetector`'s
//! baselines from recent history, mirroring `ScheduleLoop`'s tick-until-
//! cancelled shape.

use std::sync::Arc;
use std::time::Duration;

use engine::anomaly::{self, AnomalyDetector};
use engine::recorder::ExecutionRecorder;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use catalog::CatalogCache;

/// Default refresh cadence (SPEC_FULL ambient config names 1h for the
/// companion worker; baselines don't need to move faster than that).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

pub struct BaselineRefreshLoop {
    catalog: Arc<CatalogCache>,
    recorder: Arc<dyn ExecutionRecorder>,
    detector: AnomalyDetector,
    sample_size: u64,
    interval: Duration,
}

impl BaselineRefreshLoop {
    pub fn new(
        catalog: Arc<CatalogCache>,
        recorder: Arc<dyn ExecutionRecorder>,
        detector: AnomalyDetector,
        sample_size: u64,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self { catalog, recorder, detector, sample_size, interval })
    }

    /// Runs until `shutdown` is cancelled, refreshing immediately on start
    /// rather than waiting out the first interval.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.tick().await;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("baseline refresh loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let names: Vec<String> = self.catalog.list_workflows().into_iter().map(|w| w.name.clone()).collect();
        if let Err(err) = anomaly::refresh_baselines(&self.detector, self.recorder.as_ref(), &names, self.sample_size).await {
            warn!(%err, "baseline refresh failed");
        }
    }
}
