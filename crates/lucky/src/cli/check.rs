use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use console::style;
use lucky_core::config::{KeyRole, LuckyConfig, SERVICE_KEY_VAR};
use lucky_runtime::migrations::load_migrations;

use super::print_header;

/// Check configuration and list migration files. Never connects to the database.
#[derive(Parser)]
pub struct CheckCommand {
    /// Migrations directory (overrides config).
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

impl CheckCommand {
    pub fn execute(self, config: LuckyConfig, config_path: &Path) -> Result<()> {
        print_header("Check");

        let missing = missing_variables(&config);
        if !missing.is_empty() {
            println!(
                "  {} Missing backend configuration",
                style("⚠").yellow()
            );
            println!();
            println!(
                "  Set the following in .env, the environment, or {}:",
                config_path.display()
            );
            for var in &missing {
                println!("    {} {}", style("-").dim(), style(var).yellow());
            }
            println!();
            anyhow::bail!("Missing configuration: {}", missing.join(", "));
        }

        println!("  {} Backend configuration found", style("✓").green());
        match config.backend.direct_url() {
            Some(_) => println!("    Direct database connection (DATABASE_URL)"),
            None => {
                if let Some(url) = config.backend.url.as_deref() {
                    println!("    URL: {}...", url.chars().take(30).collect::<String>());
                }
            }
        }

        let dir = self.dir.unwrap_or_else(|| config.migrations.dir.clone());
        if !dir.is_dir() {
            println!();
            println!("  {} Migrations directory not found!", style("✗").red());
            anyhow::bail!("Migrations directory not found: {}", dir.display());
        }

        let migrations = load_migrations(&dir)?;
        println!();
        println!(
            "  {} Found {} migration file(s):",
            style("📂").bold(),
            migrations.len()
        );
        for (i, migration) in migrations.iter().enumerate() {
            println!("    {}. {}", i + 1, migration.name);
        }

        println!();
        println!("  {}", style("=".repeat(60)).dim());
        println!();
        println!("  To initialize your database, choose one option:");
        println!();
        println!("  {}", style("Option 1: Apply from the CLI").bold());
        println!("     Run: lucky migrate up");
        println!();

        let service_key_set = config.backend.missing_for(KeyRole::Service).is_empty();
        if service_key_set {
            println!("  {}", style("Option 2: Migration endpoint").bold());
            println!("     1. Start the server: lucky serve --dev");
            println!(
                "     2. Visit: http://localhost:{}/api/migrate",
                config.server.port
            );
            println!("     Note: Only works in development mode");
        } else {
            println!(
                "  {}",
                style("Option 2: Migration endpoint (not available)").dim()
            );
            println!("     To enable, set {}", SERVICE_KEY_VAR);
        }
        println!();

        println!("  {}", style("Option 3: Manual SQL execution").bold());
        println!("     1. Run: lucky migrate print");
        println!("     2. Paste the output into the database SQL editor and run it");
        println!();
        println!("  {}", style("=".repeat(60)).dim());
        println!();

        Ok(())
    }
}

/// Variables the CLI needs that are not configured.
fn missing_variables(config: &LuckyConfig) -> Vec<&'static str> {
    if config.backend.direct_url().is_some() {
        return Vec::new();
    }
    config.backend.missing_for(KeyRole::Anon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucky_core::config::{ANON_KEY_VAR, BACKEND_URL_VAR};

    #[test]
    fn test_missing_variables() {
        let mut config = LuckyConfig::default();
        assert_eq!(missing_variables(&config), vec![BACKEND_URL_VAR, ANON_KEY_VAR]);

        config.backend.url = Some("https://project.example.co".to_string());
        assert_eq!(missing_variables(&config), vec![ANON_KEY_VAR]);

        config.backend.anon_key = Some("anon".to_string());
        assert!(missing_variables(&config).is_empty());
    }

    #[test]
    fn test_direct_url_needs_nothing_else() {
        let mut config = LuckyConfig::default();
        config.backend.database_url = Some("postgres://localhost/app".to_string());
        assert!(missing_variables(&config).is_empty());
    }

    #[test]
    fn test_check_fails_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LuckyConfig::default();
        config.backend.url = Some("https://project.example.co".to_string());
        config.backend.anon_key = Some("anon".to_string());

        let cmd = CheckCommand {
            dir: Some(dir.path().join("missing")),
        };
        assert!(cmd.execute(config.clone(), Path::new("lucky.toml")).is_err());

        std::fs::write(dir.path().join("001_init.sql"), "SELECT 1;").unwrap();
        let cmd = CheckCommand {
            dir: Some(dir.path().to_path_buf()),
        };
        assert!(cmd.execute(config, Path::new("lucky.toml")).is_ok());
    }
}
