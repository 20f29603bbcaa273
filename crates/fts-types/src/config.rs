//! Configuration loading for the message full-text index.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/message-fts/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Lifecycle tuning shared by both backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Upper bound on a single rebuild, in seconds.
    /// Unset means a rebuild runs until it finishes or fails.
    #[serde(default)]
    pub rebuild_timeout_secs: Option<u64>,
}

/// SQLite FTS5 backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SqliteSettings {
    /// sqlx connection URL, e.g. `sqlite://messages.db?mode=rwc`
    #[serde(default = "default_sqlite_url")]
    pub database_url: String,

    #[serde(default = "default_primary_table")]
    pub primary_table: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_content_column")]
    pub content_column: String,

    /// Name of the FTS5 virtual table (also prefixes the trigger names)
    #[serde(default = "default_index_table")]
    pub index_table: String,

    #[serde(default = "default_sqlite_connections")]
    pub max_connections: u32,
}

/// Postgres tsvector backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostgresSettings {
    /// sqlx connection URL, e.g. `postgres://localhost/messages`
    #[serde(default = "default_postgres_url")]
    pub database_url: String,

    #[serde(default = "default_primary_table")]
    pub primary_table: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_content_column")]
    pub content_column: String,

    /// Derived tsvector column added to the primary table
    #[serde(default = "default_vector_column")]
    pub vector_column: String,

    /// Text-search configuration passed to `to_tsvector`
    #[serde(default = "default_text_search_config")]
    pub text_search_config: String,

    #[serde(default = "default_postgres_connections")]
    pub max_connections: u32,
}

fn default_sqlite_url() -> String {
    let path = ProjectDirs::from("", "", "message-fts")
        .map(|p| p.data_local_dir().join("messages.db"))
        .unwrap_or_else(|| PathBuf::from("./messages.db"));
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}

fn default_postgres_url() -> String {
    "postgres://localhost/messages".to_string()
}

fn default_primary_table() -> String {
    "messages".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_content_column() -> String {
    "content".to_string()
}

fn default_index_table() -> String {
    "messages_fts".to_string()
}

fn default_vector_column() -> String {
    "search_vector".to_string()
}

fn default_text_search_config() -> String {
    "simple".to_string()
}

fn default_sqlite_connections() -> u32 {
    4
}

fn default_postgres_connections() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            database_url: default_sqlite_url(),
            primary_table: default_primary_table(),
            id_column: default_id_column(),
            content_column: default_content_column(),
            index_table: default_index_table(),
            max_connections: default_sqlite_connections(),
        }
    }
}

impl SqliteSettings {
    /// Check that every configured name is safe to splice into DDL.
    pub fn validate(&self) -> Result<(), TypesError> {
        validate_identifier("sqlite.primary_table", &self.primary_table)?;
        validate_identifier("sqlite.id_column", &self.id_column)?;
        validate_identifier("sqlite.content_column", &self.content_column)?;
        validate_identifier("sqlite.index_table", &self.index_table)?;
        Ok(())
    }
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: default_postgres_url(),
            primary_table: default_primary_table(),
            id_column: default_id_column(),
            content_column: default_content_column(),
            vector_column: default_vector_column(),
            text_search_config: default_text_search_config(),
            max_connections: default_postgres_connections(),
        }
    }
}

impl PostgresSettings {
    /// Check that every configured name is safe to splice into DDL.
    pub fn validate(&self) -> Result<(), TypesError> {
        validate_identifier("postgres.primary_table", &self.primary_table)?;
        validate_identifier("postgres.id_column", &self.id_column)?;
        validate_identifier("postgres.content_column", &self.content_column)?;
        validate_identifier("postgres.vector_column", &self.vector_column)?;
        validate_identifier("postgres.text_search_config", &self.text_search_config)?;
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub lifecycle: LifecycleSettings,

    #[serde(default)]
    pub sqlite: SqliteSettings,

    #[serde(default)]
    pub postgres: PostgresSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lifecycle: LifecycleSettings::default(),
            sqlite: SqliteSettings::default(),
            postgres: PostgresSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/message-fts/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (FTS_*, nested keys split on `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "message-fts")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: FTS_LOG_LEVEL, FTS_SQLITE__DATABASE_URL, FTS_LIFECYCLE__REBUILD_TIMEOUT_SECS
        builder = builder.add_source(
            Environment::with_prefix("FTS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate both backend sections.
    pub fn validate(&self) -> Result<(), TypesError> {
        self.sqlite.validate()?;
        self.postgres.validate()?;
        Ok(())
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes (the Postgres limit).
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), TypesError> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && value.len() <= 63 {
        Ok(())
    } else {
        Err(TypesError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.lifecycle.rebuild_timeout_secs, None);
        assert_eq!(settings.sqlite.primary_table, "messages");
        assert_eq!(settings.sqlite.index_table, "messages_fts");
        assert_eq!(settings.postgres.vector_column, "search_vector");
        assert_eq!(settings.postgres.text_search_config, "simple");
        assert!(settings.sqlite.database_url.starts_with("sqlite://"));
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.sqlite.id_column, "id");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fts.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\
             [lifecycle]\nrebuild_timeout_secs = 120\n\
             [sqlite]\nindex_table = \"chat_fts\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path.to_string_lossy())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.lifecycle.rebuild_timeout_secs, Some(120));
        assert_eq!(settings.sqlite.index_table, "chat_fts");
        // Untouched fields keep their defaults
        assert_eq!(settings.sqlite.content_column, "content");
    }

    #[test]
    fn test_load_rejects_bad_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fts.toml");
        std::fs::write(&path, "[postgres]\nprimary_table = \"messages;--\"\n").unwrap();

        let result = Settings::load(Some(&path.to_string_lossy()));
        assert!(matches!(
            result,
            Err(TypesError::InvalidIdentifier {
                field: "postgres.primary_table",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("f", "messages").is_ok());
        assert!(validate_identifier("f", "_private_2").is_ok());
        assert!(validate_identifier("f", "").is_err());
        assert!(validate_identifier("f", "2fast").is_err());
        assert!(validate_identifier("f", "messages fts").is_err());
        assert!(validate_identifier("f", "\"quoted\"").is_err());
        assert!(validate_identifier("f", &"x".repeat(64)).is_err());
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.sqlite, settings.sqlite);
        assert_eq!(decoded.postgres, settings.postgres);
    }
}
