//! Lifecycle orchestrator shared by every backend.
//!
//! [`IndexManager::ensure`] runs once per process after the primary-table
//! migrations. It decides inline whether the derived index can be trusted,
//! and otherwise hands the rebuild to a background task so startup never
//! waits on a backfill.
//!
//! ```ignore
//! let manager = IndexManager::new(driver, store, ManagerConfig::default());
//! manager.ensure().await?;          // fatal only if the version table can't be created
//!
//! if manager.is_ready() {
//!     // indexed search
//! } else {
//!     // fallback scan
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fts_types::{LifecycleSettings, VersionRecord};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::driver::IndexDriver;
use crate::error::LifecycleError;
use crate::guard::FlightGuard;
use crate::rebuild::{
    success_message, IndexHealth, RebuildOutcome, RebuildPhase, RebuildReport, RebuildStats,
};
use crate::state::LifecycleState;
use crate::store::VersionStore;

/// Orchestrator tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Abort a rebuild that runs longer than this. `None` never times out.
    pub rebuild_timeout: Option<Duration>,
}

impl From<&LifecycleSettings> for ManagerConfig {
    fn from(settings: &LifecycleSettings) -> Self {
        Self {
            rebuild_timeout: settings.rebuild_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// What [`IndexManager::ensure`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// `ensure` already ran for this manager; nothing was checked
    AlreadyInitialized,
    /// Record and schema are current; the index is serving
    Ready,
    /// A background rebuild was launched
    RebuildStarted,
    /// A rebuild was needed but one is already running
    RebuildInProgress,
}

struct Inner<D, S> {
    driver: D,
    store: S,
    state: LifecycleState,
    config: ManagerConfig,
    shutdown: CancellationToken,
    phase: watch::Sender<RebuildPhase>,
}

/// Lifecycle manager for one backend's derived index.
///
/// Cloning is cheap; clones share the same flags and completion channel.
pub struct IndexManager<D, S> {
    inner: Arc<Inner<D, S>>,
}

impl<D, S> Clone for IndexManager<D, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D, S> fmt::Debug for IndexManager<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("state", &self.inner.state)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<D: IndexDriver, S: VersionStore> IndexManager<D, S> {
    pub fn new(driver: D, store: S, config: ManagerConfig) -> Self {
        let (phase, _) = watch::channel(RebuildPhase::Idle);
        Self {
            inner: Arc::new(Inner {
                driver,
                store,
                state: LifecycleState::new(),
                config,
                shutdown: CancellationToken::new(),
                phase,
            }),
        }
    }

    /// Version record key of the managed index.
    pub fn key(&self) -> &str {
        self.inner.driver.key()
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn state(&self) -> &LifecycleState {
        &self.inner.state
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Bring the index to a trustworthy state, once per manager.
    ///
    /// Returns as soon as the decision is made; a needed rebuild runs in the
    /// background. The only error is a failed version-store migration.
    pub async fn ensure(&self) -> Result<EnsureOutcome, LifecycleError> {
        let inner = &self.inner;
        let key = inner.driver.key();

        if inner.state.is_initialized() || !inner.state.mark_initialized() {
            debug!(key, "Index manager already initialized");
            return Ok(EnsureOutcome::AlreadyInitialized);
        }

        inner
            .store
            .migrate()
            .await
            .map_err(|e| LifecycleError::Init(e.to_string()))?;

        let target = inner.driver.target_version();
        let record = match inner.store.get(key).await {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "Failed to read version record, treating as unknown");
                VersionRecord::unknown(key)
            }
        };

        if record.is_current(target) {
            match inner.driver.validate_schema().await {
                Ok(true) => {
                    inner.state.mark_ready();
                    info!(key, version = record.version, "Search index ready");
                    return Ok(EnsureOutcome::Ready);
                }
                Ok(false) => {
                    warn!(key, "Version record says ready but index schema is incomplete");
                }
                Err(e) => {
                    warn!(key, error = %e, "Could not validate index schema");
                }
            }
        } else {
            info!(
                key,
                version = record.version,
                status = %record.status,
                target,
                "Search index needs rebuild"
            );
        }

        if self.rebuild_now() {
            Ok(EnsureOutcome::RebuildStarted)
        } else {
            Ok(EnsureOutcome::RebuildInProgress)
        }
    }

    /// Launch a background rebuild unless one is already running.
    ///
    /// Returns `false` when the attempt was dropped by the single-flight
    /// guard. Must be called from within a Tokio runtime.
    pub fn rebuild_now(&self) -> bool {
        self.spawn_rebuild().is_some()
    }

    /// Start a rebuild (or join the one in flight) and wait for its report.
    pub async fn force_rebuild(&self) -> Result<RebuildReport, LifecycleError> {
        if self.spawn_rebuild().is_none() {
            info!(key = self.key(), "Rebuild already in flight, waiting for it");
        }
        self.wait_for_rebuild()
            .await
            .ok_or_else(|| LifecycleError::Task("rebuild finished without a report".to_string()))
    }

    /// Wait for the current rebuild to finish.
    ///
    /// Returns the latest report, or `None` if no rebuild has run yet.
    pub async fn wait_for_rebuild(&self) -> Option<RebuildReport> {
        let mut rx = self.inner.phase.subscribe();
        let phase = rx
            .wait_for(|phase| !matches!(phase, RebuildPhase::Running))
            .await
            .ok()?;
        match &*phase {
            RebuildPhase::Finished(report) => Some(report.clone()),
            _ => None,
        }
    }

    /// Lock-free readiness check for the query layer.
    pub fn is_ready(&self) -> bool {
        self.inner.state.is_ready()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.last_error()
    }

    /// Called by the query layer when a live indexed query fails.
    ///
    /// Gates future queries to the fallback path immediately. Does not
    /// start a rebuild.
    pub fn report_failure(&self, err: impl fmt::Display) {
        let message = err.to_string();
        warn!(key = self.key(), error = %message, "Indexed search failed, falling back");
        self.inner.state.record_failure(message);
    }

    /// Ask an in-flight rebuild to stop at its next statement boundary.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!(key = self.key(), "Search index manager shutting down");
            self.inner.shutdown.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Collect flags, stored record and live schema checks.
    pub async fn status(&self) -> IndexHealth {
        let driver = &self.inner.driver;
        let key = driver.key();

        let record = match self.inner.store.get(key).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(key, error = %e, "Version record unavailable");
                None
            }
        };
        let schema_valid = match driver.validate_schema().await {
            Ok(valid) => Some(valid),
            Err(e) => {
                debug!(key, error = %e, "Schema validation unavailable");
                None
            }
        };
        let indexed_rows = driver.indexed_rows().await.ok();

        IndexHealth {
            key: key.to_string(),
            target_version: driver.target_version(),
            state: self.inner.state.snapshot(),
            record,
            schema_valid,
            indexed_rows,
        }
    }

    fn spawn_rebuild(&self) -> Option<JoinHandle<()>> {
        let mut claimed = None;
        // Claim the slot and publish `Running` under the channel lock, so a
        // waiter that loses the claim always observes this rebuild.
        self.inner.phase.send_if_modified(|phase| {
            claimed = self.inner.state.try_begin_rebuild();
            if claimed.is_some() {
                *phase = RebuildPhase::Running;
                true
            } else {
                false
            }
        });

        let Some(guard) = claimed else {
            debug!(key = self.key(), "Rebuild already in flight, dropping request");
            return None;
        };

        let inner = self.inner.clone();
        Some(tokio::spawn(inner.run_rebuild(guard)))
    }
}

impl<D: IndexDriver, S: VersionStore> Inner<D, S> {
    async fn run_rebuild(self: Arc<Self>, guard: FlightGuard) {
        let key = self.driver.key().to_string();
        let started = Instant::now();
        info!(key = %key, "Search index rebuild started");

        if let Err(e) = self.store.upsert(&VersionRecord::building(&key)).await {
            warn!(key = %key, error = %e, "Failed to record building status, continuing");
        }

        let result = self.clone().execute_driver().await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(stats) => {
                self.state.record_success();
                let record = VersionRecord::ready(
                    &key,
                    self.driver.target_version(),
                    success_message(elapsed),
                );
                if let Err(e) = self.store.upsert(&record).await {
                    warn!(key = %key, error = %e, "Failed to record ready status");
                }
                info!(
                    key = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    statements = stats.statements,
                    rows = stats.rows_backfilled,
                    "Search index rebuild complete"
                );
                RebuildOutcome::Rebuilt { stats }
            }
            Err(err) => {
                let message = err.to_string();
                self.state.record_failure(message.clone());
                if let Err(e) = self.store.upsert(&VersionRecord::failed(&key, &message)).await {
                    warn!(key = %key, error = %e, "Failed to record error status");
                }
                error!(
                    key = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %message,
                    "Search index rebuild failed, serving without index"
                );
                match err {
                    LifecycleError::Cancelled => RebuildOutcome::Cancelled,
                    _ => RebuildOutcome::Failed { error: message },
                }
            }
        };

        // Publish and release the slot under the channel lock: waiters see
        // the report only once the slot is free, and the next rebuild's
        // `Running` can never be overwritten by this report.
        let report = RebuildReport::new(key, outcome, elapsed);
        self.phase.send_modify(move |phase| {
            *phase = RebuildPhase::Finished(report);
            drop(guard);
        });
    }

    async fn execute_driver(self: Arc<Self>) -> Result<RebuildStats, LifecycleError> {
        let cancel = self.shutdown.child_token();
        let worker = self.clone();
        let worker_cancel = cancel.clone();
        let mut task = tokio::spawn(async move { worker.driver.rebuild(&worker_cancel).await });

        let Some(limit) = self.config.rebuild_timeout else {
            return flatten_join(task.await);
        };

        match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => flatten_join(joined),
            Err(_) => {
                warn!(
                    key = self.driver.key(),
                    timeout_ms = limit.as_millis() as u64,
                    "Rebuild timed out, cancelling"
                );
                cancel.cancel();
                match task.await {
                    Ok(Err(LifecycleError::Cancelled)) => Err(LifecycleError::TimedOut(limit)),
                    joined => flatten_join(joined),
                }
            }
        }
    }
}

fn flatten_join(
    joined: Result<Result<RebuildStats, LifecycleError>, JoinError>,
) -> Result<RebuildStats, LifecycleError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(LifecycleError::Task("rebuild panicked".to_string())),
        Err(e) => Err(LifecycleError::Task(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVersionStore;
    use async_trait::async_trait;
    use fts_types::IndexStatus;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const KEY: &str = "messages_fts";

    /// Driver whose schema validity and rebuild behaviour are scripted.
    #[derive(Default)]
    struct ScriptedDriver {
        valid: AtomicBool,
        validate_errors: AtomicBool,
        fail_rebuild: AtomicBool,
        panic_rebuild: AtomicBool,
        delay: Duration,
        rebuilds: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedDriver {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn rebuilds(&self) -> usize {
            self.rebuilds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IndexDriver for ScriptedDriver {
        fn key(&self) -> &str {
            KEY
        }

        fn target_version(&self) -> i64 {
            1
        }

        async fn validate_schema(&self) -> Result<bool, LifecycleError> {
            if self.validate_errors.load(Ordering::SeqCst) {
                return Err(LifecycleError::Validation("catalog locked".to_string()));
            }
            Ok(self.valid.load(Ordering::SeqCst))
        }

        async fn rebuild(
            &self,
            cancel: &CancellationToken,
        ) -> Result<RebuildStats, LifecycleError> {
            self.rebuilds.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let waited = tokio::select! {
                _ = cancel.cancelled() => Err(LifecycleError::Cancelled),
                _ = tokio::time::sleep(self.delay) => Ok(()),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            waited?;

            if self.panic_rebuild.load(Ordering::SeqCst) {
                panic!("driver bug");
            }
            if self.fail_rebuild.load(Ordering::SeqCst) {
                return Err(LifecycleError::Step {
                    step: "backfill",
                    source: sqlx::Error::Protocol("simulated backfill failure".to_string()),
                });
            }
            self.valid.store(true, Ordering::SeqCst);
            Ok(RebuildStats {
                statements: 5,
                rows_backfilled: 42,
            })
        }

        async fn indexed_rows(&self) -> Result<i64, LifecycleError> {
            Ok(if self.valid.load(Ordering::SeqCst) { 42 } else { 0 })
        }
    }

    fn manager(
        driver: ScriptedDriver,
        store: MemoryVersionStore,
    ) -> IndexManager<ScriptedDriver, MemoryVersionStore> {
        IndexManager::new(driver, store, ManagerConfig::default())
    }

    #[tokio::test]
    async fn test_fresh_index_rebuilds_in_background() {
        let mgr = manager(ScriptedDriver::default(), MemoryVersionStore::new());

        assert_eq!(mgr.ensure().await.unwrap(), EnsureOutcome::RebuildStarted);
        let report = mgr.wait_for_rebuild().await.unwrap();

        assert!(report.is_success());
        assert!(mgr.is_ready());
        assert_eq!(mgr.last_error(), None);

        let record = mgr.store().snapshot(KEY).unwrap();
        assert_eq!(record.status, IndexStatus::Ready);
        assert_eq!(record.version, 1);
        assert!(record.message.starts_with("rebuilt in "));
        // building + ready
        assert_eq!(mgr.store().write_count(), 2);
    }

    #[tokio::test]
    async fn test_ensure_is_one_shot() {
        let mgr = manager(ScriptedDriver::default(), MemoryVersionStore::new());

        mgr.ensure().await.unwrap();
        mgr.wait_for_rebuild().await;
        assert_eq!(
            mgr.ensure().await.unwrap(),
            EnsureOutcome::AlreadyInitialized
        );
        assert_eq!(mgr.driver().rebuilds(), 1);
    }

    #[tokio::test]
    async fn test_current_record_and_valid_schema_skips_rebuild() {
        let driver = ScriptedDriver::default();
        driver.valid.store(true, Ordering::SeqCst);
        let store = MemoryVersionStore::new().with_record(VersionRecord::ready(KEY, 1, ""));
        let mgr = manager(driver, store);

        assert_eq!(mgr.ensure().await.unwrap(), EnsureOutcome::Ready);
        assert!(mgr.is_ready());
        assert_eq!(mgr.driver().rebuilds(), 0);
        assert_eq!(mgr.store().write_count(), 0);
        assert_eq!(mgr.wait_for_rebuild().await, None);
    }

    #[tokio::test]
    async fn test_ready_record_with_torn_schema_rebuilds_once() {
        let store = MemoryVersionStore::new().with_record(VersionRecord::ready(KEY, 1, ""));
        let mgr = manager(ScriptedDriver::default(), store);

        assert_eq!(mgr.ensure().await.unwrap(), EnsureOutcome::RebuildStarted);
        mgr.wait_for_rebuild().await.unwrap();
        assert_eq!(mgr.driver().rebuilds(), 1);
        assert!(mgr.is_ready());
    }

    #[tokio::test]
    async fn test_validation_error_counts_as_invalid() {
        let driver = ScriptedDriver::default();
        driver.validate_errors.store(true, Ordering::SeqCst);
        let store = MemoryVersionStore::new().with_record(VersionRecord::ready(KEY, 1, ""));
        let mgr = manager(driver, store);

        assert_eq!(mgr.ensure().await.unwrap(), EnsureOutcome::RebuildStarted);
        mgr.wait_for_rebuild().await.unwrap();
        assert_eq!(mgr.driver().rebuilds(), 1);
    }

    #[tokio::test]
    async fn test_stale_status_rebuilds_without_validating() {
        let driver = ScriptedDriver::default();
        driver.valid.store(true, Ordering::SeqCst);
        let store = MemoryVersionStore::new().with_record(VersionRecord::building(KEY));
        let mgr = manager(driver, store);

        assert_eq!(mgr.ensure().await.unwrap(), EnsureOutcome::RebuildStarted);
        mgr.wait_for_rebuild().await.unwrap();
        assert_eq!(mgr.driver().rebuilds(), 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_records_error_without_retry() {
        let driver = ScriptedDriver::default();
        driver.fail_rebuild.store(true, Ordering::SeqCst);
        let mgr = manager(driver, MemoryVersionStore::new());

        mgr.ensure().await.unwrap();
        let report = mgr.wait_for_rebuild().await.unwrap();

        assert!(!report.is_success());
        assert!(!mgr.is_ready());
        let last_error = mgr.last_error().unwrap();
        assert!(last_error.contains("simulated backfill failure"));

        let record = mgr.store().snapshot(KEY).unwrap();
        assert_eq!(record.status, IndexStatus::Error);
        assert_eq!(record.version, 0);
        assert_eq!(record.message, last_error);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mgr.driver().rebuilds(), 1);
    }

    #[tokio::test]
    async fn test_migration_failure_is_fatal() {
        let store = MemoryVersionStore::new();
        store.set_fail_migrate(true);
        let mgr = manager(ScriptedDriver::default(), store);

        let result = mgr.ensure().await;
        assert!(matches!(result, Err(LifecycleError::Init(_))));
        assert_eq!(mgr.driver().rebuilds(), 0);
    }

    #[tokio::test]
    async fn test_status_write_failures_do_not_stop_rebuild() {
        let store = MemoryVersionStore::new();
        store.set_fail_writes(true);
        let mgr = manager(ScriptedDriver::default(), store);

        mgr.ensure().await.unwrap();
        let report = mgr.wait_for_rebuild().await.unwrap();
        assert!(report.is_success());
        assert!(mgr.is_ready());
        assert!(mgr.store().snapshot(KEY).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_single_flight() {
        let mgr = manager(
            ScriptedDriver::with_delay(Duration::from_millis(50)),
            MemoryVersionStore::new(),
        );

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let mgr = mgr.clone();
                tokio::spawn(async move {
                    let _ = mgr.ensure().await;
                    mgr.rebuild_now()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        mgr.wait_for_rebuild().await.unwrap();

        assert_eq!(mgr.driver().max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!mgr.state().is_rebuilding());
    }

    #[tokio::test]
    async fn test_building_record_drops_previous_version() {
        let store = MemoryVersionStore::new().with_record(VersionRecord::ready(KEY, 1, ""));
        let mgr = manager(
            ScriptedDriver::with_delay(Duration::from_millis(200)),
            store,
        );
        mgr.ensure().await.unwrap();

        let mut record = mgr.store().snapshot(KEY).unwrap();
        for _ in 0..50 {
            if record.status == IndexStatus::Building {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            record = mgr.store().snapshot(KEY).unwrap();
        }
        assert_eq!(record.status, IndexStatus::Building);
        assert_eq!(record.version, 0);

        assert!(mgr.wait_for_rebuild().await.unwrap().is_success());
        assert_eq!(mgr.store().snapshot(KEY).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_report_failure_during_rebuild() {
        let mgr = manager(
            ScriptedDriver::with_delay(Duration::from_millis(100)),
            MemoryVersionStore::new(),
        );
        mgr.ensure().await.unwrap();
        assert!(mgr.state().is_rebuilding());

        mgr.report_failure("fts5: syntax error near \"AND\"");
        assert!(!mgr.is_ready());
        assert_eq!(
            mgr.last_error().as_deref(),
            Some("fts5: syntax error near \"AND\"")
        );
        assert!(mgr.state().is_rebuilding());

        mgr.wait_for_rebuild().await.unwrap();
        assert_eq!(mgr.driver().rebuilds(), 1);
    }

    #[tokio::test]
    async fn test_report_failure_does_not_rebuild() {
        let driver = ScriptedDriver::default();
        driver.valid.store(true, Ordering::SeqCst);
        let store = MemoryVersionStore::new().with_record(VersionRecord::ready(KEY, 1, ""));
        let mgr = manager(driver, store);
        mgr.ensure().await.unwrap();

        mgr.report_failure("no such table: messages_fts");
        assert!(!mgr.is_ready());
        assert!(!mgr.state().is_rebuilding());
        assert_eq!(mgr.driver().rebuilds(), 0);
    }

    #[tokio::test]
    async fn test_force_rebuild_joins_in_flight() {
        let mgr = manager(
            ScriptedDriver::with_delay(Duration::from_millis(50)),
            MemoryVersionStore::new(),
        );
        assert!(mgr.rebuild_now());
        assert!(!mgr.rebuild_now());

        let report = mgr.force_rebuild().await.unwrap();
        assert!(report.is_success());
        assert_eq!(mgr.driver().rebuilds(), 1);

        // Slot is free again: a forced rebuild now runs a second time
        let report = mgr.force_rebuild().await.unwrap();
        assert!(report.is_success());
        assert_eq!(mgr.driver().rebuilds(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_rebuild() {
        let mgr = manager(
            ScriptedDriver::with_delay(Duration::from_secs(30)),
            MemoryVersionStore::new(),
        );
        mgr.ensure().await.unwrap();
        mgr.shutdown();

        let report = mgr.wait_for_rebuild().await.unwrap();
        assert_eq!(report.outcome, RebuildOutcome::Cancelled);
        assert!(!mgr.is_ready());
        let record = mgr.store().snapshot(KEY).unwrap();
        assert_eq!(record.status, IndexStatus::Error);
        assert_eq!(record.message, "Rebuild cancelled");
    }

    #[tokio::test]
    async fn test_rebuild_timeout() {
        let mgr = IndexManager::new(
            ScriptedDriver::with_delay(Duration::from_secs(30)),
            MemoryVersionStore::new(),
            ManagerConfig {
                rebuild_timeout: Some(Duration::from_millis(20)),
            },
        );

        let report = mgr.force_rebuild().await.unwrap();
        match &report.outcome {
            RebuildOutcome::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
        assert!(!mgr.is_shutdown());
    }

    #[tokio::test]
    async fn test_driver_panic_is_contained() {
        let driver = ScriptedDriver::default();
        driver.panic_rebuild.store(true, Ordering::SeqCst);
        let mgr = manager(driver, MemoryVersionStore::new());

        let report = mgr.force_rebuild().await.unwrap();
        assert_eq!(report.error(), Some("Rebuild task failed: rebuild panicked"));
        assert!(!mgr.state().is_rebuilding());
        assert!(!mgr.is_ready());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let mgr = manager(ScriptedDriver::default(), MemoryVersionStore::new());
        mgr.force_rebuild().await.unwrap();

        let health = mgr.status().await;
        assert_eq!(health.key, KEY);
        assert_eq!(health.target_version, 1);
        assert!(health.state.ready);
        assert_eq!(health.schema_valid, Some(true));
        assert_eq!(health.indexed_rows, Some(42));
        assert_eq!(health.record.unwrap().status, IndexStatus::Ready);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LifecycleSettings {
            rebuild_timeout_secs: Some(90),
        };
        let config = ManagerConfig::from(&settings);
        assert_eq!(config.rebuild_timeout, Some(Duration::from_secs(90)));
        assert_eq!(
            ManagerConfig::from(&LifecycleSettings::default()).rebuild_timeout,
            None
        );
    }
}
