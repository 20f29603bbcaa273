//! Rebuild bookkeeping: statistics, outcomes and the completion signal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fts_types::VersionRecord;
use serde::{Deserialize, Serialize};

use crate::state::StateSnapshot;

/// Counters collected by a driver while it rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    /// Statements executed, including drops that were no-ops.
    pub statements: u32,
    /// Rows written by the backfill step.
    pub rows_backfilled: u64,
}

impl RebuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed statement and the rows it touched.
    pub fn record_statement(&mut self, rows_affected: u64, is_backfill: bool) {
        self.statements += 1;
        if is_backfill {
            self.rows_backfilled += rows_affected;
        }
    }
}

/// How a rebuild ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebuildOutcome {
    Rebuilt { stats: RebuildStats },
    Failed { error: String },
    Cancelled,
}

/// Result of one rebuild, published on the manager's completion channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub key: String,
    #[serde(flatten)]
    pub outcome: RebuildOutcome,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RebuildReport {
    pub fn new(key: impl Into<String>, outcome: RebuildOutcome, elapsed: Duration) -> Self {
        Self {
            key: key.into(),
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RebuildOutcome::Rebuilt { .. })
    }

    /// Error text for failed or cancelled rebuilds.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RebuildOutcome::Rebuilt { .. } => None,
            RebuildOutcome::Failed { error } => Some(error),
            RebuildOutcome::Cancelled => Some("Rebuild cancelled"),
        }
    }
}

/// Phase published on the completion channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RebuildPhase {
    /// No rebuild has run in this process yet
    #[default]
    Idle,
    Running,
    Finished(RebuildReport),
}

/// Combined view of one backend's index, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealth {
    pub key: String,
    pub target_version: i64,
    pub state: StateSnapshot,
    /// `None` when the version store could not be read
    pub record: Option<VersionRecord>,
    /// `None` when introspection could not run
    pub schema_valid: Option<bool>,
    /// `None` when the index could not be counted
    pub indexed_rows: Option<i64>,
}

/// Message stored on a successful rebuild.
pub fn success_message(elapsed: Duration) -> String {
    format!("rebuilt in {elapsed:?}")
}
