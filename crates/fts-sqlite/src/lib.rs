//! # fts-sqlite
//!
//! SQLite FTS5 backend for the message index lifecycle.
//!
//! The derived index is an FTS5 virtual table kept in step with the primary
//! table by after-insert, after-delete and after-update triggers. Version
//! records live in `fts_index_versions` in the same database file.

pub mod driver;
pub mod store;

use std::str::FromStr;
use std::time::Duration;

use fts_lifecycle::{IndexManager, LifecycleError, ManagerConfig};
use fts_types::SqliteSettings;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use driver::{Fts5Driver, FTS5_TARGET_VERSION, FTS5_TOKENIZER};
pub use store::SqliteVersionStore;

/// Lifecycle manager for the FTS5 index.
pub type SqliteIndexManager = IndexManager<Fts5Driver, SqliteVersionStore>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pool on `settings.database_url`, creating the file if needed.
pub async fn connect(settings: &SqliteSettings) -> Result<SqlitePool, LifecycleError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    info!(url = %settings.database_url, "Opened SQLite pool");
    Ok(pool)
}

/// Build a manager whose driver and version store share `pool`.
pub fn manager(
    pool: SqlitePool,
    settings: &SqliteSettings,
    config: ManagerConfig,
) -> Result<SqliteIndexManager, LifecycleError> {
    let driver = Fts5Driver::new(pool.clone(), settings)?;
    let store = SqliteVersionStore::new(pool);
    Ok(IndexManager::new(driver, store, config))
}
