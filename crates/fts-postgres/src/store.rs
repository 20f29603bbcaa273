//! Version records in a Postgres table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fts_lifecycle::{LifecycleError, VersionStore, VERSION_TABLE};
use fts_types::{IndexStatus, VersionRecord};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct PgVersionStore {
    pool: PgPool,
}

impl PgVersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> LifecycleError {
    LifecycleError::VersionStore(e.to_string())
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn migrate(&self) -> Result<(), LifecycleError> {
        sqlx::raw_sql(&format!(
            "CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (\
             key TEXT PRIMARY KEY, \
             version BIGINT NOT NULL, \
             status TEXT NOT NULL, \
             message TEXT NOT NULL DEFAULT '', \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        ))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<VersionRecord, LifecycleError> {
        let row = sqlx::query(&format!(
            "SELECT version, status, message, updated_at FROM {VERSION_TABLE} WHERE key = $1"
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
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (key) DO UPDATE SET \
             version = EXCLUDED.version, \
             status = EXCLUDED.status, \
             message = EXCLUDED.message, \
             updated_at = EXCLUDED.updated_at"
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
