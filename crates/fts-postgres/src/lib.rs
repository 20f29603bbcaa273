//! # fts-postgres
//!
//! Postgres backend for the message index lifecycle.
//!
//! The derived index is a `tsvector` column on the primary table, a GIN
//! index over it and a `BEFORE INSERT OR UPDATE` trigger that recomputes
//! the column for every written row.

pub mod driver;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use fts_lifecycle::{IndexManager, LifecycleError, ManagerConfig};
use fts_types::PostgresSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub use driver::{TsvectorDriver, TSVECTOR_TARGET_VERSION};
pub use store::PgVersionStore;

/// Lifecycle manager for the tsvector index.
pub type PgIndexManager = IndexManager<TsvectorDriver, PgVersionStore>;

pub async fn connect(settings: &PostgresSettings) -> Result<PgPool, LifecycleError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    info!("Opened Postgres pool");
    Ok(pool)
}

/// Build a manager whose driver and version store share `pool`.
pub fn manager(
    pool: PgPool,
    settings: &PostgresSettings,
    config: ManagerConfig,
) -> Result<PgIndexManager, LifecycleError> {
    let driver = TsvectorDriver::new(pool.clone(), settings)?;
    let store = PgVersionStore::new(pool);
    Ok(IndexManager::new(driver, store, config))
}
