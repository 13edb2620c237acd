//! The shared migration runner behind both the HTTP endpoint and the CLI.
//!
//! Migrations run one at a time, in name order, in a single pass. There is
//! no lock against a concurrent run; the bookkeeping table's unique `name`
//! column is the only guard, and a duplicate insert is treated as success.

use std::path::Path;
use std::sync::Arc;

use lucky_core::config::MigrationsConfig;
use lucky_core::error::{LuckyError, Result};
use lucky_core::migration::{Migration, MigrationResult, MigrationStatus, RunReport, SplitMode};
use tracing::{debug, error, info, warn};

use super::loader::load_migrations;
use super::splitter::split_statements;
use crate::backend::{quote_ident, BackendErrorKind, MigrationBackend};

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Bookkeeping table name.
    pub table: String,
    pub split_mode: SplitMode,
    /// Issue `CREATE TABLE IF NOT EXISTS` for the bookkeeping table first.
    pub create_table: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&MigrationsConfig::default())
    }
}

impl From<&MigrationsConfig> for RunnerOptions {
    fn from(config: &MigrationsConfig) -> Self {
        Self {
            table: config.table.clone(),
            split_mode: config.split_mode,
            create_table: config.create_table,
        }
    }
}

/// Whether a migration file has already been recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMigration {
    pub name: String,
    pub applied: bool,
}

/// Applies pending migrations through a backend.
pub struct MigrationRunner {
    backend: Arc<dyn MigrationBackend>,
    options: RunnerOptions,
}

impl MigrationRunner {
    pub fn new(backend: Arc<dyn MigrationBackend>, options: RunnerOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Load every `*.sql` file in `dir` and run the pending ones.
    pub async fn run(&self, dir: &Path) -> Result<RunReport> {
        let migrations = load_migrations(dir)?;
        self.run_migrations(migrations).await
    }

    /// Run `migrations` in the given order.
    ///
    /// Per-migration failures are recorded in the report and the loop moves on.
    /// Only an unavailable exec procedure stops the run, because every later
    /// migration would fail the same way. The results gathered up to that
    /// point travel in [`LuckyError::RunAborted`].
    pub async fn run_migrations(&self, migrations: Vec<Migration>) -> Result<RunReport> {
        let mut report = RunReport::default();

        if migrations.is_empty() {
            info!("No migration files found");
            return Ok(report);
        }

        info!(
            "Starting database migrations ({} file(s), backend {})",
            migrations.len(),
            self.backend.describe()
        );

        if self.options.create_table {
            if let Err(e) = self.ensure_bookkeeping_table().await {
                return Err(LuckyError::RunAborted {
                    report,
                    source: Box::new(e),
                });
            }
        }

        for migration in &migrations {
            match self.apply(migration).await {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    error!(
                        "Migration run stopped after {} of {} file(s)",
                        report.results.len(),
                        migrations.len()
                    );
                    return Err(LuckyError::RunAborted {
                        report,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(
            "Database migrations check completed: {} completed, {} skipped, {} not recorded, {} failed",
            report.count(MigrationStatus::Completed),
            report.count(MigrationStatus::Skipped),
            report.count(MigrationStatus::CompletedButNotRecorded),
            report.count(MigrationStatus::Failed),
        );

        Ok(report)
    }

    /// Apply one migration unless it is already recorded.
    pub async fn apply(&self, migration: &Migration) -> Result<MigrationResult> {
        let table = self.options.table.as_str();
        let name = migration.name.as_str();

        debug!("Running: {}", name);

        // A failed lookup usually means the bookkeeping table does not exist
        // yet; the migration that creates it must still run.
        match self.backend.is_applied(table, name).await {
            Ok(true) => {
                info!("Skipped: {} (already executed)", name);
                return Ok(MigrationResult::skipped(name));
            }
            Ok(false) => {}
            Err(e) => debug!("Bookkeeping lookup for {} failed, applying: {}", name, e),
        }

        for statement in split_statements(&migration.sql, self.options.split_mode) {
            if let Err(e) = self.backend.execute(&statement).await {
                if e.kind == BackendErrorKind::ExecUnavailable {
                    error!(
                        "SQL execution is not available on the backend; apply {} manually",
                        name
                    );
                    return Err(LuckyError::ExecUnavailable(e.message));
                }
                error!("Failed: {}: {}", name, e);
                return Ok(MigrationResult::failed(name, e.to_string()));
            }
        }

        match self.backend.record_applied(table, name).await {
            Ok(()) => {
                info!("Completed: {}", name);
                Ok(MigrationResult::completed(name))
            }
            Err(e) if e.is_unique_violation() => {
                debug!("{} was already recorded by another run", name);
                info!("Completed: {}", name);
                Ok(MigrationResult::completed(name))
            }
            Err(e) => {
                warn!("Could not record migration {}: {}", name, e);
                Ok(MigrationResult::not_recorded(name, e.to_string()))
            }
        }
    }

    /// Report which migrations are already recorded without applying anything.
    pub async fn plan(&self, migrations: &[Migration]) -> Vec<PlannedMigration> {
        let mut planned = Vec::with_capacity(migrations.len());
        for migration in migrations {
            let applied = match self
                .backend
                .is_applied(&self.options.table, &migration.name)
                .await
            {
                Ok(applied) => applied,
                Err(e) => {
                    debug!("Bookkeeping lookup for {} failed: {}", migration.name, e);
                    false
                }
            };
            planned.push(PlannedMigration {
                name: migration.name.clone(),
                applied,
            });
        }
        planned
    }

    async fn ensure_bookkeeping_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            quote_ident(&self.options.table)
        );

        match self.backend.execute(&sql).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind == BackendErrorKind::ExecUnavailable => {
                Err(LuckyError::ExecUnavailable(e.message))
            }
            Err(e) => {
                warn!(
                    "Could not create bookkeeping table {}: {}",
                    self.options.table, e
                );
                Ok(())
            }
        }
    }
}
