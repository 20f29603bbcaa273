//! Command implementations for the index admin tool.
//!
//! Handles:
//! - ensure: startup check, waiting for any rebuild it starts
//! - status: JSON health report
//! - rebuild: forced rebuild, Ctrl-C cancels it
//! - validate: read-only schema check

use anyhow::{bail, Context, Result};
use fts_lifecycle::{
    EnsureOutcome, IndexDriver, IndexHealth, LifecycleError, ManagerConfig, RebuildReport,
    VersionStore,
};
use fts_postgres::PgIndexManager;
use fts_sqlite::SqliteIndexManager;
use fts_types::{BackendKind, Settings};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, Target};

/// Either backend's manager, behind one set of operations.
pub enum Manager {
    Sqlite(SqliteIndexManager),
    Postgres(PgIndexManager),
}

impl Manager {
    pub async fn open(settings: &Settings, backend: BackendKind) -> Result<Self> {
        let config = ManagerConfig::from(&settings.lifecycle);
        match backend {
            BackendKind::Sqlite => {
                let pool = fts_sqlite::connect(&settings.sqlite)
                    .await
                    .context("Failed to open SQLite database")?;
                Ok(Manager::Sqlite(fts_sqlite::manager(
                    pool,
                    &settings.sqlite,
                    config,
                )?))
            }
            BackendKind::Postgres => {
                let pool = fts_postgres::connect(&settings.postgres)
                    .await
                    .context("Failed to connect to Postgres")?;
                Ok(Manager::Postgres(fts_postgres::manager(
                    pool,
                    &settings.postgres,
                    config,
                )?))
            }
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Manager::Sqlite(m) => m.key(),
            Manager::Postgres(m) => m.key(),
        }
    }

    async fn ensure(&self) -> Result<EnsureOutcome, LifecycleError> {
        match self {
            Manager::Sqlite(m) => m.ensure().await,
            Manager::Postgres(m) => m.ensure().await,
        }
    }

    async fn migrate(&self) -> Result<(), LifecycleError> {
        match self {
            Manager::Sqlite(m) => m.store().migrate().await,
            Manager::Postgres(m) => m.store().migrate().await,
        }
    }

    async fn force_rebuild(&self) -> Result<RebuildReport, LifecycleError> {
        match self {
            Manager::Sqlite(m) => m.force_rebuild().await,
            Manager::Postgres(m) => m.force_rebuild().await,
        }
    }

    async fn wait_for_rebuild(&self) -> Option<RebuildReport> {
        match self {
            Manager::Sqlite(m) => m.wait_for_rebuild().await,
            Manager::Postgres(m) => m.wait_for_rebuild().await,
        }
    }

    async fn validate_schema(&self) -> Result<bool, LifecycleError> {
        match self {
            Manager::Sqlite(m) => m.driver().validate_schema().await,
            Manager::Postgres(m) => m.driver().validate_schema().await,
        }
    }

    async fn status(&self) -> IndexHealth {
        match self {
            Manager::Sqlite(m) => m.status().await,
            Manager::Postgres(m) => m.status().await,
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Manager::Sqlite(m) => m.is_ready(),
            Manager::Postgres(m) => m.is_ready(),
        }
    }

    fn shutdown(&self) {
        match self {
            Manager::Sqlite(m) => m.shutdown(),
            Manager::Postgres(m) => m.shutdown(),
        }
    }
}

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    target: &Target,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(url) = &target.database_url {
        match target.backend {
            BackendKind::Sqlite => settings.sqlite.database_url = url.clone(),
            BackendKind::Postgres => settings.postgres.database_url = url.clone(),
        }
    }
    Ok(settings)
}

fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Run one parsed command against its backend.
pub async fn run(cli: Cli) -> Result<()> {
    let target = cli.command.target().clone();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref(), &target)?;
    init_logging(&settings.log_level)?;

    let manager = Manager::open(&settings, target.backend).await?;
    info!(key = manager.key(), backend = %target.backend, "Index manager opened");

    match cli.command {
        Commands::Ensure { .. } => ensure(&manager).await,
        Commands::Status { .. } => status(&manager).await,
        Commands::Rebuild { .. } => rebuild(&manager).await,
        Commands::Validate { .. } => validate(&manager).await,
    }
}

/// Wait for the running rebuild, cancelling it on Ctrl-C.
async fn wait_or_interrupt(manager: &Manager) -> Option<RebuildReport> {
    tokio::select! {
        report = manager.wait_for_rebuild() => report,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling rebuild");
            manager.shutdown();
            manager.wait_for_rebuild().await
        }
    }
}

fn print_report(report: &RebuildReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if let Some(error) = report.error() {
        bail!("Rebuild of {} failed: {error}", report.key);
    }
    Ok(())
}

/// The process exits when this returns, taking any spawned task with it, so
/// a rebuild started here is always awaited.
pub async fn ensure(manager: &Manager) -> Result<()> {
    let outcome = manager
        .ensure()
        .await
        .context("Failed to initialize search index")?;
    println!("{}: {outcome:?}", manager.key());

    if matches!(
        outcome,
        EnsureOutcome::RebuildStarted | EnsureOutcome::RebuildInProgress
    ) {
        let report = wait_or_interrupt(manager)
            .await
            .context("Rebuild finished without a report")?;
        print_report(&report)?;
    }

    println!("ready: {}", manager.is_ready());
    Ok(())
}

pub async fn status(manager: &Manager) -> Result<()> {
    let health = manager.status().await;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

pub async fn rebuild(manager: &Manager) -> Result<()> {
    manager
        .migrate()
        .await
        .context("Failed to create version table")?;

    let report = tokio::select! {
        report = manager.force_rebuild() => report?,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling rebuild");
            manager.shutdown();
            manager
                .wait_for_rebuild()
                .await
                .context("Rebuild did not report after cancellation")?
        }
    };
    print_report(&report)
}

pub async fn validate(manager: &Manager) -> Result<()> {
    let valid = manager
        .validate_schema()
        .await
        .context("Schema introspection failed")?;
    if !valid {
        bail!("Index schema for {} is incomplete", manager.key());
    }
    println!("{}: schema valid", manager.key());
    Ok(())
}
