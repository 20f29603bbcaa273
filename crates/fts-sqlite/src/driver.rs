//! FTS5 driver: a virtual table fed by three triggers on the primary table.

use async_trait::async_trait;
use fts_lifecycle::{
    check_cancelled, CancellationToken, IndexDriver, LifecycleError, PlannedStatement,
    RebuildStats,
};
use fts_types::{BackendKind, SqliteSettings};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Generation of the FTS5 schema produced by [`Fts5Driver::rebuild_plan`].
pub const FTS5_TARGET_VERSION: i64 = 1;

/// Unicode-aware tokenizer that keeps diacritics distinct.
pub const FTS5_TOKENIZER: &str = "unicode61 remove_diacritics 0";

const BACKFILL_STEP: &str = "backfill";

/// Engine-A driver for SQLite FTS5.
#[derive(Debug, Clone)]
pub struct Fts5Driver {
    pool: SqlitePool,
    settings: SqliteSettings,
}

impl Fts5Driver {
    pub fn new(pool: SqlitePool, settings: &SqliteSettings) -> Result<Self, LifecycleError> {
        settings.validate()?;
        Ok(Self {
            pool,
            settings: settings.clone(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn index_table(&self) -> &str {
        &self.settings.index_table
    }

    /// After-insert, after-delete and after-update trigger names.
    pub fn trigger_names(&self) -> [String; 3] {
        let idx = &self.settings.index_table;
        [format!("{idx}_ai"), format!("{idx}_ad"), format!("{idx}_au")]
    }

    /// Drop and recreate the virtual table and its triggers.
    pub fn schema_plan(&self) -> Vec<PlannedStatement> {
        let SqliteSettings {
            primary_table: table,
            id_column: id,
            content_column: content,
            index_table: idx,
            ..
        } = &self.settings;
        let [insert_trigger, delete_trigger, update_trigger] = self.trigger_names();

        vec![
            PlannedStatement::new(
                "drop_insert_trigger",
                format!("DROP TRIGGER IF EXISTS {insert_trigger}"),
            ),
            PlannedStatement::new(
                "drop_delete_trigger",
                format!("DROP TRIGGER IF EXISTS {delete_trigger}"),
            ),
            PlannedStatement::new(
                "drop_update_trigger",
                format!("DROP TRIGGER IF EXISTS {update_trigger}"),
            ),
            PlannedStatement::new("drop_index_table", format!("DROP TABLE IF EXISTS {idx}")),
            PlannedStatement::new(
                "create_index_table",
                format!(
                    "CREATE VIRTUAL TABLE {idx} USING fts5(\
                     message_id UNINDEXED, content, tokenize='{FTS5_TOKENIZER}')"
                ),
            ),
            PlannedStatement::new(
                "create_insert_trigger",
                format!(
                    "CREATE TRIGGER {insert_trigger} AFTER INSERT ON {table} BEGIN \
                     INSERT INTO {idx}(message_id, content) VALUES (new.{id}, new.{content}); \
                     END"
                ),
            ),
            PlannedStatement::new(
                "create_delete_trigger",
                format!(
                    "CREATE TRIGGER {delete_trigger} AFTER DELETE ON {table} BEGIN \
                     DELETE FROM {idx} WHERE message_id = old.{id}; \
                     END"
                ),
            ),
            PlannedStatement::new(
                "create_update_trigger",
                format!(
                    "CREATE TRIGGER {update_trigger} AFTER UPDATE ON {table} BEGIN \
                     DELETE FROM {idx} WHERE message_id = old.{id}; \
                     INSERT INTO {idx}(message_id, content) VALUES (new.{id}, new.{content}); \
                     END"
                ),
            ),
        ]
    }

    /// Copy every existing primary row into the index in one statement.
    pub fn backfill_statement(&self) -> PlannedStatement {
        let SqliteSettings {
            primary_table: table,
            id_column: id,
            content_column: content,
            index_table: idx,
            ..
        } = &self.settings;
        PlannedStatement::new(
            BACKFILL_STEP,
            format!("INSERT INTO {idx}(message_id, content) SELECT {id}, {content} FROM {table}"),
        )
    }

    /// Full rebuild: schema, then backfill.
    pub fn rebuild_plan(&self) -> Vec<PlannedStatement> {
        let mut plan = self.schema_plan();
        plan.push(self.backfill_statement());
        plan
    }

    /// Execute statements one at a time, outside any transaction.
    pub async fn run_plan(
        &self,
        plan: &[PlannedStatement],
        cancel: &CancellationToken,
    ) -> Result<RebuildStats, LifecycleError> {
        let mut stats = RebuildStats::new();
        for statement in plan {
            check_cancelled(cancel)?;
            debug!(step = statement.step, "Executing FTS5 rebuild statement");
            let result = sqlx::query(&statement.sql)
                .persistent(false)
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

    /// Message ids whose content contains `phrase` as a token sequence.
    ///
    /// The phrase is quoted, so FTS5 operators in it are matched literally.
    /// Ids are decoded as `i64`, so the primary id column must be an integer.
    pub async fn matching_ids(&self, phrase: &str) -> Result<Vec<i64>, LifecycleError> {
        let idx = &self.settings.index_table;
        let quoted = format!("\"{}\"", phrase.replace('"', "\"\""));
        let rows = sqlx::query(&format!(
            "SELECT message_id FROM {idx} WHERE {idx} MATCH ? ORDER BY message_id"
        ))
        .bind(quoted)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("message_id").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl IndexDriver for Fts5Driver {
    fn key(&self) -> &str {
        BackendKind::Sqlite.version_key()
    }

    fn target_version(&self) -> i64 {
        FTS5_TARGET_VERSION
    }

    async fn validate_schema(&self) -> Result<bool, LifecycleError> {
        let idx = &self.settings.index_table;
        let triggers = self.trigger_names();

        let rows = sqlx::query(
            "SELECT type, name, tbl_name, sql FROM sqlite_master WHERE name IN (?, ?, ?, ?)",
        )
        .bind(idx)
        .bind(&triggers[0])
        .bind(&triggers[1])
        .bind(&triggers[2])
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LifecycleError::Validation(e.to_string()))?;

        let mut has_table = false;
        let mut trigger_count = 0;
        for row in &rows {
            let kind: String = row.try_get("type")?;
            let name: String = row.try_get("name")?;
            let tbl_name: String = row.try_get("tbl_name")?;
            let sql: Option<String> = row.try_get("sql")?;

            match kind.as_str() {
                "table" if &name == idx => {
                    has_table = sql
                        .map(|ddl| ddl.to_ascii_lowercase().contains("using fts5"))
                        .unwrap_or(false);
                }
                "trigger" if tbl_name == self.settings.primary_table => {
                    trigger_count += 1;
                }
                _ => {}
            }
        }

        debug!(has_table, trigger_count, "Validated FTS5 schema");
        Ok(has_table && trigger_count == triggers.len())
    }

    async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildStats, LifecycleError> {
        self.run_plan(&self.rebuild_plan(), cancel).await
    }

    async fn indexed_rows(&self) -> Result<i64, LifecycleError> {
        let idx = &self.settings.index_table;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {idx}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
