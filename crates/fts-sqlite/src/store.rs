//! Version records in a plain SQLite table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fts_lifecycle::{LifecycleError, VersionStore, VERSION_TABLE};
use fts_types::{IndexStatus, VersionRecord};
use sqlx::{Row, SqlitePool};

/// [`VersionStore`] backed by the same SQLite database as the index.
#[derive(Debug, Clone)]
pub struct SqliteVersionStore {
    pool: SqlitePool,
}

impl SqliteVersionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> LifecycleError {
    LifecycleError::VersionStore(e.to_string())
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn migrate(&self) -> Result<(), LifecycleError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (\
             key TEXT PRIMARY KEY, \
             version INTEGER NOT NULL, \
             status TEXT NOT NULL, \
             message TEXT NOT NULL DEFAULT '', \
             updated_at TEXT NOT NULL)"
        ))
        .persistent(false)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<VersionRecord, LifecycleError> {
        let row = sqlx::query(&format!(
            "SELECT version, status, message, updated_at FROM {VERSION_TABLE} WHERE key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(VersionRecord::unknown(key));
        };

        let status: String = row.try_get("status").map_err(store_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(store_err)?;
        Ok(VersionRecord {
            key: key.to_string(),
            version: row.try_get("version").map_err(store_err)?,
            status: IndexStatus::parse(&status),
            message: row.try_get("message").map_err(store_err)?,
            updated_at,
        })
    }

    async fn upsert(&self, record: &VersionRecord) -> Result<(), LifecycleError> {
        sqlx::query(&format!(
            "INSERT INTO {VERSION_TABLE} (key, version, status, message, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
             version = excluded.version, \
             status = excluded.status, \
             message = excluded.message, \
             updated_at = excluded.updated_at"
        ))
        .bind(&record.key)
        .bind(record.version)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> (tempfile::TempDir, SqliteVersionStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("v.db").display());
        let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
        let store = SqliteVersionStore::new(pool);
        store.migrate().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, store) = store().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_key_is_unknown() {
        let (_dir, store) = store().await;
        let record = store.get("messages_fts").await.unwrap();
        assert_eq!(record.status, IndexStatus::Unknown);
        assert_eq!(record.version, 0);
        assert_eq!(record.message, "");
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let (_dir, store) = store().await;
        store
            .upsert(&VersionRecord::building("messages_fts"))
            .await
            .unwrap();
        let ready = VersionRecord::ready("messages_fts", 1, "rebuilt in 40ms");
        store.upsert(&ready).await.unwrap();

        let record = store.get("messages_fts").await.unwrap();
        assert_eq!(record.status, IndexStatus::Ready);
        assert_eq!(record.version, 1);
        assert_eq!(record.message, "rebuilt in 40ms");
        assert_eq!(record.updated_at, ready.updated_at);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fts_index_versions")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_status_reads_as_unknown() {
        let (_dir, store) = store().await;
        sqlx::query(
            "INSERT INTO fts_index_versions (key, version, status, message, updated_at) \
             VALUES ('messages_fts', 1, 'paused', '', '2024-01-01T00:00:00Z')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let record = store.get("messages_fts").await.unwrap();
        assert_eq!(record.status, IndexStatus::Unknown);
        assert!(!record.is_current(1));
    }

    #[tokio::test]
    async fn test_get_without_table_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("v.db").display());
        let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
        let store = SqliteVersionStore::new(pool);

        let result = store.get("messages_fts").await;
        assert!(matches!(result, Err(LifecycleError::VersionStore(_))));
    }
}
