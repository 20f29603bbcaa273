//! End-to-end test infrastructure for the message full-text index.
//!
//! Provides harnesses that own a real database with a `messages` table,
//! helpers to fill it, and a driver wrapper that fails the backfill on
//! demand.

use std::str::FromStr;

use async_trait::async_trait;
use fts_lifecycle::{
    CancellationToken, IndexDriver, IndexManager, LifecycleError, ManagerConfig, RebuildStats,
};
use fts_postgres::{PgIndexManager, PgVersionStore, TsvectorDriver};
use fts_sqlite::{Fts5Driver, SqliteIndexManager, SqliteVersionStore};
use fts_types::{PostgresSettings, SqliteSettings};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, SqlitePool};

/// Every thousandth generated message carries this term.
pub const NEEDLE: &str = "needle";

const SEED_SQL: &str = "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?) \
     INSERT INTO messages (id, content) \
     SELECT n, CASE WHEN n % 1000 = 0 THEN 'haystack needle ' || n ELSE 'haystack hay ' || n END \
     FROM seq";

/// Shared test harness for SQLite scenarios.
///
/// The database file lives in a temp dir, so a second pool opened with
/// [`TestHarness::restart`] sees the same data, like a process restart.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub settings: SqliteSettings,
    pub pool: SqlitePool,
}

impl TestHarness {
    /// Create a database with an empty `messages` table.
    pub async fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let settings = SqliteSettings {
            database_url: format!(
                "sqlite://{}",
                temp_dir.path().join("messages.db").display()
            ),
            ..Default::default()
        };
        let pool = fts_sqlite::connect(&settings)
            .await
            .expect("Failed to open test database");
        sqlx::query("CREATE TABLE messages (id INTEGER PRIMARY KEY, content TEXT NOT NULL)")
            .execute(&pool)
            .await
            .expect("Failed to create messages table");

        Self {
            _temp_dir: temp_dir,
            settings,
            pool,
        }
    }

    pub fn manager(&self) -> SqliteIndexManager {
        fts_sqlite::manager(self.pool.clone(), &self.settings, ManagerConfig::default())
            .expect("Failed to build manager")
    }

    /// Fresh pool and manager on the same file, with no in-memory state.
    pub async fn restart(&self) -> SqliteIndexManager {
        let pool = fts_sqlite::connect(&self.settings)
            .await
            .expect("Failed to reopen test database");
        fts_sqlite::manager(pool, &self.settings, ManagerConfig::default())
            .expect("Failed to build manager")
    }

    /// Manager whose rebuild creates the schema and then fails the backfill.
    pub fn flaky_manager(&self) -> IndexManager<FlakyBackfill, SqliteVersionStore> {
        let driver =
            Fts5Driver::new(self.pool.clone(), &self.settings).expect("Failed to build driver");
        IndexManager::new(
            FlakyBackfill::new(driver),
            SqliteVersionStore::new(self.pool.clone()),
            ManagerConfig::default(),
        )
    }

    /// Insert messages 1..=count; ids divisible by 1000 contain [`NEEDLE`].
    pub async fn seed_messages(&self, count: i64) {
        sqlx::query(SEED_SQL)
            .bind(count)
            .execute(&self.pool)
            .await
            .expect("Failed to seed messages");
    }

    pub async fn insert_message(&self, id: i64, content: &str) {
        sqlx::query("INSERT INTO messages (id, content) VALUES (?, ?)")
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .await
            .expect("Failed to insert message");
    }

    /// `(distinct indexed ids, total index rows)`
    pub async fn index_counts(&self) -> (i64, i64) {
        sqlx::query_as("SELECT COUNT(DISTINCT message_id), COUNT(*) FROM messages_fts")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count index rows")
    }

    /// Index objects as stored in `sqlite_master`, for idempotency checks.
    pub async fn schema_objects(&self) -> Vec<(String, String, Option<String>)> {
        sqlx::query_as(
            "SELECT type, name, sql FROM sqlite_master \
             WHERE name LIKE 'messages_fts%' ORDER BY type, name",
        )
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read sqlite_master")
    }

    pub async fn drop_object(&self, sql: &str) {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .expect("Failed to alter schema");
    }
}

/// Expected ids for a [`NEEDLE`] search over `seed_messages(count)`.
pub fn needle_ids(count: i64) -> Vec<i64> {
    (1..=count).filter(|n| n % 1000 == 0).collect()
}

/// FTS5 driver that runs the schema steps and then fails the backfill,
/// leaving a torn index behind.
pub struct FlakyBackfill {
    inner: Fts5Driver,
}

impl FlakyBackfill {
    pub fn new(inner: Fts5Driver) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl IndexDriver for FlakyBackfill {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn target_version(&self) -> i64 {
        self.inner.target_version()
    }

    async fn validate_schema(&self) -> Result<bool, LifecycleError> {
        self.inner.validate_schema().await
    }

    async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildStats, LifecycleError> {
        self.inner.run_plan(&self.inner.schema_plan(), cancel).await?;
        Err(LifecycleError::Step {
            step: "backfill",
            source: sqlx::Error::Protocol("injected backfill failure".to_string()),
        })
    }

    async fn indexed_rows(&self) -> Result<i64, LifecycleError> {
        self.inner.indexed_rows().await
    }
}

/// tsvector driver that adds the column and then fails the backfill, so
/// no GIN index, function or trigger exists afterwards.
pub struct FlakyPgBackfill {
    inner: TsvectorDriver,
}

impl FlakyPgBackfill {
    pub fn new(inner: TsvectorDriver) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl IndexDriver for FlakyPgBackfill {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn target_version(&self) -> i64 {
        self.inner.target_version()
    }

    async fn validate_schema(&self) -> Result<bool, LifecycleError> {
        self.inner.validate_schema().await
    }

    async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildStats, LifecycleError> {
        let before_backfill: Vec<_> = self
            .inner
            .rebuild_plan()
            .into_iter()
            .take_while(|statement| statement.step != "backfill")
            .collect();
        self.inner.run_plan(&before_backfill, cancel).await?;
        Err(LifecycleError::Step {
            step: "backfill",
            source: sqlx::Error::Protocol("injected backfill failure".to_string()),
        })
    }

    async fn indexed_rows(&self) -> Result<i64, LifecycleError> {
        self.inner.indexed_rows().await
    }
}

/// Environment variable naming the Postgres used by the Postgres scenarios.
pub const POSTGRES_URL_ENV: &str = "FTS_TEST_POSTGRES_URL";

/// Postgres harness: each instance gets its own schema, so the version
/// table and `messages` never collide between tests.
pub struct PgHarness {
    pub pool: PgPool,
    pub settings: PostgresSettings,
    pub schema: String,
}

impl PgHarness {
    /// `None` when no test database is configured.
    pub async fn new(name: &str) -> Option<Self> {
        let url = std::env::var(POSTGRES_URL_ENV).ok()?;
        let schema = format!("fts_e2e_{name}_{}", std::process::id());

        let admin = PgPool::connect(&url)
            .await
            .expect("Failed to connect to test Postgres");
        sqlx::raw_sql(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema}"
        ))
        .execute(&admin)
        .await
        .expect("Failed to create test schema");
        admin.close().await;

        let options = PgConnectOptions::from_str(&url)
            .expect("Invalid Postgres URL")
            .options([("search_path", schema.as_str())]);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .expect("Failed to connect to test schema");
        sqlx::query("CREATE TABLE messages (id BIGINT PRIMARY KEY, content TEXT)")
            .execute(&pool)
            .await
            .expect("Failed to create messages table");

        Some(Self {
            pool,
            settings: PostgresSettings {
                database_url: url,
                ..Default::default()
            },
            schema,
        })
    }

    pub fn manager(&self) -> PgIndexManager {
        fts_postgres::manager(self.pool.clone(), &self.settings, ManagerConfig::default())
            .expect("Failed to build manager")
    }

    /// Manager whose rebuild stops after adding the column.
    pub fn flaky_manager(&self) -> IndexManager<FlakyPgBackfill, PgVersionStore> {
        let driver =
            TsvectorDriver::new(self.pool.clone(), &self.settings).expect("Failed to build driver");
        IndexManager::new(
            FlakyPgBackfill::new(driver),
            PgVersionStore::new(self.pool.clone()),
            ManagerConfig::default(),
        )
    }

    /// `(rows with a vector, total rows)` in this harness's `messages`.
    pub async fn vector_counts(&self) -> (i64, i64) {
        sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE search_vector IS NOT NULL), COUNT(*) FROM messages",
        )
        .fetch_one(&self.pool)
        .await
        .expect("Failed to count vectors")
    }

    pub async fn seed_messages(&self, count: i64) {
        sqlx::query(
            "INSERT INTO messages (id, content) \
             SELECT n, CASE WHEN n % 1000 = 0 THEN 'haystack needle ' || n \
             ELSE 'haystack hay ' || n END \
             FROM generate_series(1, $1::bigint) AS n",
        )
        .bind(count)
        .execute(&self.pool)
        .await
        .expect("Failed to seed messages");
    }

    pub async fn insert_message(&self, id: i64, content: &str) {
        sqlx::query("INSERT INTO messages (id, content) VALUES ($1, $2)")
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .await
            .expect("Failed to insert message");
    }

    pub async fn drop_schema(self) {
        sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .expect("Failed to drop test schema");
    }
}
