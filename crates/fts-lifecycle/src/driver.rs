//! Backend driver contract.
//!
//! A driver owns the engine-specific half of the lifecycle: checking that
//! the derived index artifacts exist, and tearing down and rebuilding them.
//! The orchestrator in [`crate::manager`] is written once against this trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::rebuild::RebuildStats;

/// A named DDL/DML statement in a rebuild plan.
///
/// Plans run statement by statement, each committing on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    /// Short label used in logs and error messages
    pub step: &'static str,
    pub sql: String,
}

impl PlannedStatement {
    pub fn new(step: &'static str, sql: impl Into<String>) -> Self {
        Self {
            step,
            sql: sql.into(),
        }
    }
}

/// Engine-specific validation and rebuild for one derived index.
#[async_trait]
pub trait IndexDriver: Send + Sync + 'static {
    /// Version record key, one per backend.
    fn key(&self) -> &str;

    /// Generation a ready index must carry.
    fn target_version(&self) -> i64;

    /// Check that every derived artifact exists.
    ///
    /// `Ok(false)` means the schema is missing or torn. `Err` means the check
    /// itself could not run; callers treat both as "rebuild needed".
    async fn validate_schema(&self) -> Result<bool, LifecycleError>;

    /// Drop and recreate the derived index, then backfill it.
    ///
    /// Implementations check `cancel` between statements and return
    /// [`LifecycleError::Cancelled`] once it fires.
    async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildStats, LifecycleError>;

    /// Number of rows currently held by the derived index.
    async fn indexed_rows(&self) -> Result<i64, LifecycleError>;
}

/// Bail out of a rebuild plan if shutdown was requested.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), LifecycleError> {
    if cancel.is_cancelled() {
        Err(LifecycleError::Cancelled)
    } else {
        Ok(())
    }
}
