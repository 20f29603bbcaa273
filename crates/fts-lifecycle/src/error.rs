//! Error types for index lifecycle operations.

use std::time::Duration;

use fts_types::TypesError;
use thiserror::Error;

/// Errors that can occur while managing a derived index
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Version store migration failed. Fatal to the caller of `ensure`.
    #[error("Version store migration failed: {0}")]
    Init(String),

    /// Version store read/write failed
    #[error("Version store error: {0}")]
    VersionStore(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A rebuild statement failed
    #[error("Rebuild step '{step}' failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Schema introspection could not run
    #[error("Schema validation error: {0}")]
    Validation(String),

    /// Rebuild stopped because shutdown was requested
    #[error("Rebuild cancelled")]
    Cancelled,

    /// Rebuild exceeded the configured time limit
    #[error("Rebuild timed out after {0:?}")]
    TimedOut(Duration),

    /// Rebuild task panicked or was aborted
    #[error("Rebuild task failed: {0}")]
    Task(String),

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] TypesError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LifecycleError::Init("table locked".to_string());
        assert_eq!(err.to_string(), "Version store migration failed: table locked");

        let err = LifecycleError::Cancelled;
        assert_eq!(err.to_string(), "Rebuild cancelled");

        let err = LifecycleError::TimedOut(Duration::from_secs(5));
        assert_eq!(err.to_string(), "Rebuild timed out after 5s");
    }

    #[test]
    fn test_step_error_display() {
        let err = LifecycleError::Step {
            step: "backfill",
            source: sqlx::Error::RowNotFound,
        };
        let text = err.to_string();
        assert!(text.starts_with("Rebuild step 'backfill' failed:"));
    }

    #[test]
    fn test_from_types_error() {
        let err: LifecycleError = TypesError::Config("bad".to_string()).into();
        assert!(matches!(err, LifecycleError::Config(_)));
    }
}
