//! `CatalogCache` (C1, spec.md §4.1) — a TTL-cached, read-through view of
//! one `(namespace|"all")` scope's workflow and task definitions, with
//! change notifications on refresh.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use engine::model::{TaskResource, WorkflowSpec};
use engine::WorkflowCatalog;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::source::CatalogSource;

const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Bounded per §9: "drop the oldest if a subscriber is slow" — `broadcast`
/// does exactly this once a lagging receiver falls behind this capacity.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// `{added, removed}` resource names, computed against the prior snapshot
/// (§4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl CacheChange {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    workflows: HashMap<String, WorkflowSpec>,
    tasks: HashMap<String, TaskResource>,
}

struct Inner {
    source: Arc<dyn CatalogSource>,
    namespace: Option<String>,
    ttl: Duration,
    snapshot: StdRwLock<Arc<Snapshot>>,
    refreshed_at: StdRwLock<Instant>,
    /// Single-flight guard: only one in-flight refresh per cache instance
    /// (§4.1 "a single in-flight refresh per key is enforced (double-check
    /// after lock)").
    refresh_lock: AsyncMutex<()>,
    changes: broadcast::Sender<CacheChange>,
}

/// Cheap to clone (`Arc` around the shared state) per the `WorkflowCatalog`
/// trait's expectation — the orchestrator looks a definition up once per
/// dispatch rather than holding onto a reference.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<Inner>,
}

impl CatalogCache {
    /// Builds a cache and performs one blocking initial refresh so the
    /// first synchronous `workflow()`/`task()` call isn't answered from an
    /// empty snapshot.
    pub async fn bootstrap(source: Arc<dyn CatalogSource>, namespace: Option<String>) -> anyhow::Result<Self> {
        Self::bootstrap_with_ttl(source, namespace, DEFAULT_TTL).await
    }

    pub async fn bootstrap_with_ttl(
        source: Arc<dyn CatalogSource>,
        namespace: Option<String>,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            source,
            namespace,
            ttl,
            snapshot: StdRwLock::new(Arc::new(Snapshot::default())),
            refreshed_at: StdRwLock::new(Instant::now() - ttl - Duration::from_secs(1)),
            refresh_lock: AsyncMutex::new(()),
            changes,
        });
        let cache = Self { inner };
        cache.refresh_now().await?;
        Ok(cache)
    }

    /// Subscribe to `{added, removed}` notifications emitted on every
    /// successful refresh that actually changed the resource set.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.inner.changes.subscribe()
    }

    /// Forces a refresh now, bypassing the TTL but still respecting the
    /// single-flight guard (§4.1 "double-check after lock").
    pub async fn refresh_now(&self) -> anyhow::Result<CacheChange> {
        let _guard = self.inner.refresh_lock.lock().await;

        // Double-check: another task may have refreshed while we waited for
        // the lock, making this refresh redundant.
        if self.age() < self.inner.ttl {
            return Ok(CacheChange::default());
        }

        let namespace = self.inner.namespace.as_deref();
        let workflows = match self.inner.source.list_workflows(namespace).await {
            Ok(workflows) => workflows.into_iter().map(|w| (w.name.clone(), w)).collect(),
            Err(err) => {
                warn!("catalog source list_workflows failed, keeping prior snapshot: {err}");
                self.inner.snapshot.read().unwrap().workflows.clone()
            }
        };
        let tasks = match self.inner.source.list_tasks(namespace).await {
            Ok(tasks) => tasks.into_iter().collect(),
            Err(err) => {
                warn!("catalog source list_tasks failed, keeping prior snapshot: {err}");
                self.inner.snapshot.read().unwrap().tasks.clone()
            }
        };

        self.finish_refresh(Snapshot { workflows, tasks })
    }

    fn finish_refresh(&self, next: Snapshot) -> anyhow::Result<CacheChange> {
        let previous = self.inner.snapshot.read().unwrap().clone();
        let change = diff(&previous, &next);

        *self.inner.snapshot.write().unwrap() = Arc::new(next);
        *self.inner.refreshed_at.write().unwrap() = Instant::now();

        if !change.is_empty() {
            debug!(added = ?change.added, removed = ?change.removed, "catalog snapshot changed");
            let _ = self.inner.changes.send(change.clone());
        }
        Ok(change)
    }

    fn age(&self) -> Duration {
        self.inner.refreshed_at.read().unwrap().elapsed()
    }

    /// Stale-while-revalidate: if the snapshot has aged past its TTL,
    /// fire a best-effort background refresh and keep answering from the
    /// (possibly stale) snapshot already in hand — `WorkflowCatalog`'s
    /// methods are synchronous, so a blocking read-through here isn't an
    /// option for call sites on the Orchestrator's hot path.
    fn maybe_trigger_background_refresh(&self) {
        if self.age() < self.inner.ttl {
            return;
        }
        let Ok(guard) = self.inner.refresh_lock.try_lock() else {
            return; // a refresh is already in flight
        };
        drop(guard);
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.refresh_now().await {
                warn!("background catalog refresh failed: {err}");
            }
        });
    }

    /// All workflows currently in the snapshot. The `WorkflowCatalog` trait
    /// only offers point lookups (the orchestrator never needs more), but
    /// `queue::schedule`'s trigger loop has to scan every workflow's
    /// `ScheduleTrigger`s each tick, so the cache exposes this directly
    /// rather than routing it through `engine`.
    pub fn list_workflows(&self) -> Vec<WorkflowSpec> {
        self.maybe_trigger_background_refresh();
        self.inner.snapshot.read().unwrap().workflows.values().cloned().collect()
    }
}

impl WorkflowCatalog for CatalogCache {
    fn workflow(&self, name: &str) -> Option<WorkflowSpec> {
        self.maybe_trigger_background_refresh();
        self.inner.snapshot.read().unwrap().workflows.get(name).cloned()
    }

    fn task(&self, task_ref: &str) -> Option<TaskResource> {
        self.maybe_trigger_background_refresh();
        self.inner.snapshot.read().unwrap().tasks.get(task_ref).cloned()
    }
}

fn diff(previous: &Snapshot, next: &Snapshot) -> CacheChange {
    let prev_names: HashSet<&String> = previous.workflows.keys().chain(previous.tasks.keys()).collect();
    let next_names: HashSet<&String> = next.workflows.keys().chain(next.tasks.keys()).collect();

    CacheChange {
        added: next_names.difference(&prev_names).map(|s| s.to_string()).collect(),
        removed: prev_names.difference(&next_names).map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticCatalogSource;
    use engine::model::WorkflowSpec;
    use std::time::Duration;

    #[tokio::test]
    async fn bootstrap_populates_snapshot_from_source() {
        let source = Arc::new(StaticCatalogSource::new().with_workflow(WorkflowSpec::new("wf", vec![])));
        let cache = CatalogCache::bootstrap(source, None).await.unwrap();
        assert!(cache.workflow("wf").is_some());
        assert!(cache.workflow("missing").is_none());
    }

    #[tokio::test]
    async fn refresh_emits_added_and_removed_diff() {
        let source: Arc<StaticRotatingSource> = Arc::new(StaticRotatingSource::default());
        let cache = CatalogCache::bootstrap_with_ttl(source.clone(), None, Duration::from_millis(1)).await.unwrap();
        let mut changes = cache.subscribe();

        source.set(vec!["a".to_string(), "b".to_string()]);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let change = cache.refresh_now().await.unwrap();
        assert_eq!(change.added, vec!["a".to_string(), "b".to_string()]);

        source.set(vec!["b".to_string()]);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let change = cache.refresh_now().await.unwrap();
        assert_eq!(change.removed, vec!["a".to_string()]);

        let first = changes.recv().await.unwrap();
        assert_eq!(first.added, vec!["a".to_string(), "b".to_string()]);
    }

    /// A `CatalogSource` whose workflow set can be swapped mid-test, used to
    /// exercise the cache's diff/notification path.
    #[derive(Default)]
    struct StaticRotatingSource {
        names: std::sync::Mutex<Vec<String>>,
    }

    impl StaticRotatingSource {
        fn set(&self, names: Vec<String>) {
            *self.names.lock().unwrap() = names;
        }
    }

    #[async_trait::async_trait]
    impl CatalogSource for StaticRotatingSource {
        async fn list_workflows(&self, _namespace: Option<&str>) -> anyhow::Result<Vec<WorkflowSpec>> {
            Ok(self.names.lock().unwrap().iter().map(|n| WorkflowSpec::new(n.clone(), vec![])).collect())
        }
        async fn list_tasks(&self, _namespace: Option<&str>) -> anyhow::Result<Vec<(String, TaskResource)>> {
            Ok(Vec::new())
        }
        async fn get_workflow(&self, name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<WorkflowSpec>> {
            Ok(self.names.lock().unwrap().iter().any(|n| n == name).then(|| WorkflowSpec::new(name, vec![])))
        }
        async fn get_task(&self, _name: &str, _namespace: Option<&str>) -> anyhow::Result<Option<TaskResource>> {
            Ok(None)
        }
    }
}
