//! tsvector driver: a derived column, a GIN index and a BEFORE trigger.

use async_trait::async_trait;
use fts_lifecycle::{
    check_cancelled, CancellationToken, IndexDriver, LifecycleError, PlannedStatement,
    RebuildStats,
};
use fts_types::{BackendKind, PostgresSettings};
use sqlx::PgPool;
use tracing::debug;

/// Generation of the tsvector schema produced by [`TsvectorDriver::rebuild_plan`].
pub const TSVECTOR_TARGET_VERSION: i64 = 1;

const BACKFILL_STEP: &str = "backfill";

/// Engine-B driver for Postgres full-text search.
#[derive(Debug, Clone)]
pub struct TsvectorDriver {
    pool: PgPool,
    settings: PostgresSettings,
}

impl TsvectorDriver {
    pub fn new(pool: PgPool, settings: &PostgresSettings) -> Result<Self, LifecycleError> {
        settings.validate()?;
        Ok(Self {
            pool,
            settings: settings.clone(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `<table>_<column>_idx`
    pub fn index_name(&self) -> String {
        format!(
            "{}_{}_idx",
            self.settings.primary_table, self.settings.vector_column
        )
    }

    /// `<table>_<column>_update`
    pub fn function_name(&self) -> String {
        format!(
            "{}_{}_update",
            self.settings.primary_table, self.settings.vector_column
        )
    }

    /// `<table>_<column>_trigger`
    pub fn trigger_name(&self) -> String {
        format!(
            "{}_{}_trigger",
            self.settings.primary_table, self.settings.vector_column
        )
    }

    fn vector_expr(&self, row_prefix: &str) -> String {
        format!(
            "to_tsvector('{}', coalesce({row_prefix}{}, ''))",
            self.settings.text_search_config, self.settings.content_column
        )
    }

    /// Every rebuild statement, in execution order.
    ///
    /// Each one is idempotent, so replaying the plan after a partial run
    /// converges on the same objects.
    pub fn rebuild_plan(&self) -> Vec<PlannedStatement> {
        let PostgresSettings {
            primary_table: table,
            vector_column: column,
            ..
        } = &self.settings;
        let index = self.index_name();
        let function = self.function_name();
        let trigger = self.trigger_name();

        vec![
            PlannedStatement::new(
                "add_column",
                format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column} tsvector"),
            ),
            PlannedStatement::new(
                BACKFILL_STEP,
                format!(
                    "UPDATE {table} SET {column} = {} WHERE {column} IS NULL",
                    self.vector_expr("")
                ),
            ),
            PlannedStatement::new(
                "create_index",
                format!("CREATE INDEX IF NOT EXISTS {index} ON {table} USING GIN ({column})"),
            ),
            PlannedStatement::new(
                "create_function",
                format!(
                    "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$ \
                     BEGIN \
                     NEW.{column} := {}; \
                     RETURN NEW; \
                     END \
                     $$ LANGUAGE plpgsql",
                    self.vector_expr("NEW.")
                ),
            ),
            PlannedStatement::new(
                "drop_trigger",
                format!("DROP TRIGGER IF EXISTS {trigger} ON {table}"),
            ),
            PlannedStatement::new(
                "create_trigger",
                format!(
                    "CREATE TRIGGER {trigger} BEFORE INSERT OR UPDATE ON {table} \
                     FOR EACH ROW EXECUTE FUNCTION {function}()"
                ),
            ),
        ]
    }

    /// Execute statements one at a time; each commits on its own.
    pub async fn run_plan(
        &self,
        plan: &[PlannedStatement],
        cancel: &CancellationToken,
    ) -> Result<RebuildStats, LifecycleError> {
        let mut stats = RebuildStats::new();
        for statement in plan {
            check_cancelled(cancel)?;
            debug!(step = statement.step, "Executing tsvector rebuild statement");
            let result = sqlx::raw_sql(&statement.sql)
                .execute(&self.pool)
                .await
                .map_err(|source| LifecycleError::Step {
                    step: statement.step,
                    source,
                })?;
            stats.record_statement(result.rows_affected(), statement.step == BACKFILL_STEP);
        }
        Ok(stats)
    }

    /// Ids of rows whose vector matches `phrase` under `plainto_tsquery`.
    ///
    /// Assumes an integer id column; it is cast to `bigint` on the way out.
    pub async fn matching_ids(&self, phrase: &str) -> Result<Vec<i64>, LifecycleError> {
        let PostgresSettings {
            primary_table: table,
            id_column: id,
            vector_column: column,
            text_search_config: ts_config,
            ..
        } = &self.settings;
        let ids = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT {id}::bigint FROM {table} \
             WHERE {column} @@ plainto_tsquery('{ts_config}', $1) ORDER BY {id}"
        ))
        .bind(phrase)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn column_exists(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             AND column_name = $2 AND udt_name = 'tsvector')",
        )
        .bind(&self.settings.primary_table)
        .bind(&self.settings.vector_column)
        .fetch_one(&self.pool)
        .await
    }

    async fn gin_index_exists(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_indexes \
             WHERE schemaname = current_schema() AND tablename = $1 AND indexname = $2 \
             AND indexdef ILIKE '%USING gin%')",
        )
        .bind(&self.settings.primary_table)
        .bind(self.index_name())
        .fetch_one(&self.pool)
        .await
    }

    async fn trigger_bound(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_trigger t \
             JOIN pg_proc p ON p.oid = t.tgfoid \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_namespace pn ON pn.oid = p.pronamespace \
             WHERE NOT t.tgisinternal \
             AND n.nspname = current_schema() AND pn.nspname = current_schema() \
             AND c.relname = $1 AND t.tgname = $2 AND p.proname = $3)",
        )
        .bind(&self.settings.primary_table)
        .bind(self.trigger_name())
        .bind(self.function_name())
        .fetch_one(&self.pool)
        .await
    }
}

#[async_trait]
impl IndexDriver for TsvectorDriver {
    fn key(&self) -> &str {
        BackendKind::Postgres.version_key()
    }

    fn target_version(&self) -> i64 {
        TSVECTOR_TARGET_VERSION
    }

    async fn validate_schema(&self) -> Result<bool, LifecycleError> {
        let validation = |e: sqlx::Error| LifecycleError::Validation(e.to_string());

        let column = self.column_exists().await.map_err(validation)?;
        let index = self.gin_index_exists().await.map_err(validation)?;
        let trigger = self.trigger_bound().await.map_err(validation)?;

        debug!(column, index, trigger, "Validated tsvector schema");
        Ok(column && index && trigger)
    }

    async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildStats, LifecycleError> {
        self.run_plan(&self.rebuild_plan(), cancel).await
    }

    async fn indexed_rows(&self) -> Result<i64, LifecycleError> {
        let PostgresSettings {
            primary_table: table,
            vector_column: column,
            ..
        } = &self.settings;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE {column} IS NOT NULL"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
