//! Error types shared across the fts crates.

use thiserror::Error;

/// Errors raised while loading or validating shared types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configured table, column or function name is not a plain identifier
    #[error("Invalid SQL identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },
}
