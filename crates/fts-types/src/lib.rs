//! Shared types for the message full-text index lifecycle.
//!
//! ## Key Components
//!
//! - [`VersionRecord`]: Persisted generation and health of one backend's index
//! - [`IndexStatus`]: Lifecycle phase stored in a version record
//! - [`BackendKind`]: Distinguishes the SQLite FTS5 and Postgres tsvector indexes
//! - [`Settings`]: Layered configuration (defaults -> file -> env -> CLI)

pub mod config;
pub mod error;
pub mod version;

pub use config::{
    validate_identifier, LifecycleSettings, PostgresSettings, Settings, SqliteSettings,
};
pub use error::TypesError;
pub use version::{BackendKind, IndexStatus, VersionRecord};
