//! # fts-lifecycle
//!
//! Keeps a derived full-text index consistent with the primary message
//! table, whichever engine hosts it.
//!
//! ## Key Components
//!
//! - [`IndexManager`]: One-shot `ensure`, background single-flight rebuilds,
//!   readiness gating and failure reporting
//! - [`IndexDriver`]: Engine-specific schema validation and rebuild
//! - [`VersionStore`]: Persistence for per-backend [`fts_types::VersionRecord`]s
//! - [`LifecycleState`]: In-memory `initialized` / `rebuilding` / `ready` /
//!   `last_error` flags
//!
//! ## Lifecycle
//!
//! 1. `ensure` migrates the version table and reads the backend's record
//! 2. A ready record at the target generation is confirmed with `validate_schema`
//! 3. Anything else launches a rebuild on a background task and returns
//! 4. The rebuild writes `building`, runs the driver, then writes `ready` or `error`
//!
//! A failed rebuild is not retried. The index stays unready until the next
//! process start or an explicit [`IndexManager::force_rebuild`].

pub mod driver;
pub mod error;
pub mod guard;
pub mod manager;
pub mod rebuild;
pub mod state;
pub mod store;

pub use driver::{check_cancelled, IndexDriver, PlannedStatement};
pub use error::LifecycleError;
pub use guard::{FlightGuard, SingleFlight};
pub use manager::{EnsureOutcome, IndexManager, ManagerConfig};
pub use rebuild::{
    success_message, IndexHealth, RebuildOutcome, RebuildPhase, RebuildReport, RebuildStats,
};
pub use state::{LifecycleState, StateSnapshot};
pub use store::{MemoryVersionStore, VersionStore, VERSION_TABLE};

// Re-exported so drivers and callers share one token type.
pub use tokio_util::sync::CancellationToken;
