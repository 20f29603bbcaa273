//! Version records for derived full-text indexes.
//!
//! One record is kept per backend key. It tracks the index generation and
//! its health so a restarted process can tell a finished build from a torn
//! one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend whose derived index is being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SQLite FTS5 virtual table
    Sqlite,
    /// Postgres tsvector column with a GIN index
    Postgres,
}

impl BackendKind {
    /// Get the version record key for this backend
    pub fn version_key(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "messages_fts",
            BackendKind::Postgres => "messages_pg_fts",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Lifecycle phase of a derived index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// No record yet, or a status string this build does not recognise
    #[default]
    Unknown,
    /// A rebuild started and has not finished
    Building,
    /// The index was rebuilt and matches the target generation
    Ready,
    /// The last rebuild failed
    Error,
}

impl IndexStatus {
    /// Stored text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Unknown => "unknown",
            IndexStatus::Building => "building",
            IndexStatus::Ready => "ready",
            IndexStatus::Error => "error",
        }
    }

    /// Parse a stored status. Unrecognised text maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "building" => IndexStatus::Building,
            "ready" => IndexStatus::Ready,
            "error" => IndexStatus::Error,
            _ => IndexStatus::Unknown,
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted generation and health of one backend's derived index.
///
/// Always written whole: callers build the complete target state and upsert it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Backend index identifier
    pub key: String,

    /// Generation number, bumped only by a successful rebuild
    pub version: i64,

    /// Current lifecycle phase
    pub status: IndexStatus,

    /// Duration on success, error text on failure
    pub message: String,

    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl VersionRecord {
    /// Zero-value record returned when nothing is stored for `key`.
    pub fn unknown(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            status: IndexStatus::Unknown,
            message: String::new(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Record marking a rebuild in progress. A torn build has no generation.
    pub fn building(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            status: IndexStatus::Building,
            message: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record for a finished rebuild at `version`.
    pub fn ready(key: impl Into<String>, version: i64, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version,
            status: IndexStatus::Ready,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }

    /// Record for a failed rebuild. The generation resets to zero.
    pub fn failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            status: IndexStatus::Error,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }

    /// True when the record claims a finished build at or above `target`.
    pub fn is_current(&self, target: i64) -> bool {
        self.status == IndexStatus::Ready && self.version >= target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_version_keys() {
        assert_eq!(BackendKind::Sqlite.version_key(), "messages_fts");
        assert_eq!(BackendKind::Postgres.version_key(), "messages_pg_fts");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("sqlite".parse::<BackendKind>(), Ok(BackendKind::Sqlite));
        assert_eq!("PG".parse::<BackendKind>(), Ok(BackendKind::Postgres));
        assert!("mysql".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_status_text_forms() {
        for status in [
            IndexStatus::Unknown,
            IndexStatus::Building,
            IndexStatus::Ready,
            IndexStatus::Error,
        ] {
            assert_eq!(IndexStatus::parse(status.as_str()), status);
        }
        assert_eq!(IndexStatus::parse("half-built"), IndexStatus::Unknown);
        assert_eq!(IndexStatus::parse(""), IndexStatus::Unknown);
    }

    #[test]
    fn test_unknown_record_is_zero_value() {
        let record = VersionRecord::unknown("messages_fts");
        assert_eq!(record.key, "messages_fts");
        assert_eq!(record.version, 0);
        assert_eq!(record.status, IndexStatus::Unknown);
        assert!(record.message.is_empty());
        assert_eq!(record.updated_at.timestamp(), 0);
    }

    #[test]
    fn test_failed_record_resets_version() {
        let record = VersionRecord::failed("messages_fts", "disk full");
        assert_eq!(record.version, 0);
        assert_eq!(record.status, IndexStatus::Error);
        assert_eq!(record.message, "disk full");
    }

    #[test]
    fn test_is_current() {
        assert!(VersionRecord::ready("k", 1, "").is_current(1));
        assert!(VersionRecord::ready("k", 2, "").is_current(1));
        assert!(!VersionRecord::ready("k", 1, "").is_current(2));
        assert!(!VersionRecord::building("k").is_current(0));
        assert!(!VersionRecord::unknown("k").is_current(0));
    }

    #[test]
    fn test_status_json_format() {
        let json = serde_json::to_string(&IndexStatus::Building).unwrap();
        assert_eq!(json, "\"building\"");
        let status: IndexStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(status, IndexStatus::Ready);
    }
}
