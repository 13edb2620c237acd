use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use lucky_core::config::{KeyRole, LuckyConfig};
use lucky_core::error::LuckyError;
use lucky_core::migration::{DatabaseStatus, MigrationResult, MigrationStatus};
use lucky_runtime::backend::connect;
use lucky_runtime::migrations::{load_migrations, probe_status, MigrationRunner, RunnerOptions};

use super::print_header;

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Migrations directory (overrides config).
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply every pending migration.
    Up,

    /// Show connection settings, database status and pending migrations.
    Status,

    /// Print every migration for pasting into a SQL editor.
    Print,
}

impl MigrateCommand {
    pub async fn execute(self, config: LuckyConfig) -> Result<()> {
        let dir = self
            .dir
            .unwrap_or_else(|| config.migrations.dir.clone());

        match self.action {
            MigrateAction::Up => up(&config, &dir).await,
            MigrateAction::Status => status(&config, &dir).await,
            MigrateAction::Print => print(&dir),
        }
    }
}

async fn up(config: &LuckyConfig, dir: &Path) -> Result<()> {
    print_header("Migrations");

    let backend = connect(config, KeyRole::Anon).await?;
    let migrations = load_migrations(dir)?;

    if migrations.is_empty() {
        println!(
            "  {} No migration files found in {}",
            style("ℹ").blue(),
            dir.display()
        );
        println!();
        return Ok(());
    }

    println!(
        "  {} Running {} migration file(s) against {}",
        style("→").dim(),
        migrations.len(),
        backend.describe()
    );
    println!();

    let runner = MigrationRunner::new(backend, RunnerOptions::from(&config.migrations));
    let report = match runner.run_migrations(migrations).await {
        Ok(report) => report,
        Err(e) => return Err(report_aborted(e)),
    };

    for result in &report.results {
        print_result(result);
    }

    println!();
    println!(
        "  {} {} completed, {} skipped, {} not recorded, {} failed",
        style("ℹ").blue(),
        report.count(MigrationStatus::Completed),
        report.count(MigrationStatus::Skipped),
        report.count(MigrationStatus::CompletedButNotRecorded),
        report.count(MigrationStatus::Failed),
    );
    println!();

    if !report.is_success() {
        anyhow::bail!(
            "{} migration(s) failed; fix them and run `lucky migrate up` again, or apply them manually (see `lucky migrate print`)",
            report.count(MigrationStatus::Failed)
        );
    }

    Ok(())
}

/// Print the migrations handled before a fatal error and return its cause.
fn report_aborted(e: LuckyError) -> anyhow::Error {
    let (report, cause) = e.into_partial();
    for result in &report.results {
        print_result(result);
    }
    if !report.is_empty() {
        println!();
    }
    println!("  {} Run stopped: {}", style("✗").red(), cause);
    println!();
    cause.into()
}

fn print_result(result: &MigrationResult) {
    let error = result.error.as_deref().unwrap_or_default();
    match result.status {
        MigrationStatus::Skipped => println!(
            "  {} {} {}",
            style("○").dim(),
            result.name,
            style("(already executed)").dim()
        ),
        MigrationStatus::Completed => {
            println!("  {} {}", style("✓").green(), style(&result.name).cyan())
        }
        MigrationStatus::CompletedButNotRecorded => println!(
            "  {} {} {}: {}",
            style("⚠").yellow(),
            style(&result.name).cyan(),
            style("applied but not recorded").yellow(),
            error
        ),
        MigrationStatus::Failed => println!(
            "  {} {}: {}",
            style("✗").red(),
            style(&result.name).red(),
            error
        ),
    }
}

async fn status(config: &LuckyConfig, dir: &Path) -> Result<()> {
    print_header("Migration Status");

    match config.backend.direct_url() {
        Some(url) => println!("  Database URL: {}", truncate(url, 30)),
        None => println!(
            "  Backend URL:  {}",
            config
                .backend
                .url
                .as_deref()
                .map(|u| truncate(u, 30))
                .unwrap_or_else(|| style("missing").red().to_string())
        ),
    }
    println!("  Table:        {}", config.migrations.table);
    println!("  Directory:    {}", dir.display());
    println!();

    let backend = connect(config, KeyRole::Anon).await?;
    let db_status = probe_status(backend.as_ref(), &config.migrations.table).await;
    let marker = match db_status {
        DatabaseStatus::Ready => style("✓").green(),
        DatabaseStatus::NeedsSetup => style("○").yellow(),
        DatabaseStatus::Error(_) => style("✗").red(),
    };
    println!("  {} {}", marker, db_status.message());
    println!();

    let migrations = load_migrations(dir)?;
    if migrations.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        println!();
        return Ok(());
    }

    let runner = MigrationRunner::new(backend, RunnerOptions::from(&config.migrations));
    let plan = runner.plan(&migrations).await;
    let (applied, pending): (Vec<_>, Vec<_>) = plan.iter().partition(|p| p.applied);

    if !applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for m in &applied {
            println!("    {} {}", style("-").dim(), style(&m.name).cyan());
        }
    }

    if !pending.is_empty() {
        if !applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for m in &pending {
            println!("    {} {}", style("→").dim(), style(&m.name).yellow());
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        applied.len(),
        pending.len()
    );
    println!();

    Ok(())
}

/// Output is plain SQL so it can be piped to a file or the clipboard.
fn print(dir: &Path) -> Result<()> {
    let migrations = load_migrations(dir)?;
    if migrations.is_empty() {
        anyhow::bail!("No migration files found in {}", dir.display());
    }

    println!("-- Run these migrations in order in the database SQL editor:");
    for (i, migration) in migrations.iter().enumerate() {
        println!("--   {}. {}", i + 1, migration.name);
    }
    println!();

    for migration in &migrations {
        println!("-- ==================================================");
        println!("-- {}", migration.name);
        println!("-- ==================================================");
        println!("{}", migration.sql.trim_end());
        println!();
    }

    Ok(())
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        format!("{}...", value.chars().take(max).collect::<String>())
    }
}
