//! Version record store contract.
//!
//! Pure storage: one row per backend key, always written whole.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use fts_types::VersionRecord;

use crate::error::LifecycleError;

/// Name of the version table on both engines.
pub const VERSION_TABLE: &str = "fts_index_versions";

/// Persistence for [`VersionRecord`]s.
#[async_trait]
pub trait VersionStore: Send + Sync + 'static {
    /// Create the version table if it does not exist.
    async fn migrate(&self) -> Result<(), LifecycleError>;

    /// Read the record for `key`.
    ///
    /// Returns [`VersionRecord::unknown`] when nothing is stored; a missing
    /// row is never an error.
    async fn get(&self, key: &str) -> Result<VersionRecord, LifecycleError>;

    /// Write every field of `record`, replacing any existing row for its key.
    async fn upsert(&self, record: &VersionRecord) -> Result<(), LifecycleError>;
}

/// In-process store, for tests and embedding without a database.
///
/// Failures can be switched on to exercise the orchestrator's error paths.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    records: RwLock<HashMap<String, VersionRecord>>,
    fail_migrate: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, as if left behind by an earlier process.
    pub fn with_record(self, record: VersionRecord) -> Self {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.key.clone(), record);
        self
    }

    pub fn set_fail_migrate(&self, fail: bool) {
        self.fail_migrate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Read a record without going through the async trait.
    pub fn snapshot(&self, key: &str) -> Option<VersionRecord> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn migrate(&self) -> Result<(), LifecycleError> {
        if self.fail_migrate.load(Ordering::SeqCst) {
            return Err(LifecycleError::VersionStore(
                "migration disabled".to_string(),
            ));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<VersionRecord, LifecycleError> {
        Ok(self
            .snapshot(key)
            .unwrap_or_else(|| VersionRecord::unknown(key)))
    }

    async fn upsert(&self, record: &VersionRecord) -> Result<(), LifecycleError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LifecycleError::VersionStore("writes disabled".to_string()));
        }
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.key.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
