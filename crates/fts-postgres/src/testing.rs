//! Shared fixtures for tests that need a live Postgres.
//!
//! Set `FTS_TEST_POSTGRES_URL` to run them; without it they return early.

use fts_types::PostgresSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const POSTGRES_URL_ENV: &str = "FTS_TEST_POSTGRES_URL";

pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var(POSTGRES_URL_ENV).ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    Some(pool)
}

/// Fresh primary table named after the test, so tests can run in parallel.
pub async fn isolated_settings(pool: &PgPool, name: &str) -> PostgresSettings {
    let table = format!("fts_{name}_{}", std::process::id());
    sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, content TEXT)"
    ))
    .execute(pool)
    .await
    .unwrap();

    PostgresSettings {
        primary_table: table,
        ..Default::default()
    }
}
