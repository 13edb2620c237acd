mod check;
mod migrate;
mod serve;

pub use check::CheckCommand;
pub use migrate::MigrateCommand;
pub use serve::ServeCommand;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use lucky_core::config::LuckyConfig;
use lucky_core::error::LuckyError;

/// lucky - SQL migrations for hosted Postgres backends
#[derive(Parser)]
#[command(name = "lucky")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = "lucky.toml", global = true)]
    pub config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Apply, inspect or print database migrations.
    Migrate(MigrateCommand),

    /// Check configuration and migration files without touching the database.
    Check(CheckCommand),

    /// Run the HTTP server exposing the migrate and status endpoints.
    Serve(ServeCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let config = LuckyConfig::load(&self.config)?;
        crate::logging::init(&config.observability, self.verbose);

        let result = match self.command {
            Commands::Migrate(cmd) => cmd.execute(config).await,
            Commands::Check(cmd) => cmd.execute(config, &self.config),
            Commands::Serve(cmd) => cmd.execute(config).await,
        };

        if let Err(e) = &result {
            if e.downcast_ref::<LuckyError>()
                .is_some_and(LuckyError::is_configuration)
            {
                eprintln!(
                    "  {} Run `lucky check` to see what is missing",
                    style("ℹ").blue()
                );
            }
        }

        result
    }
}

/// Section header shared by the commands.
pub(crate) fn print_header(title: &str) {
    println!();
    println!(
        "  {}  {} {}",
        style("🍀").bold(),
        style("LUCKY").bold().green(),
        title
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_migrate_up() {
        let cli = Cli::try_parse_from(["lucky", "migrate", "up"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("lucky.toml"));
        assert!(matches!(cli.command, Commands::Migrate(_)));
    }

    #[test]
    fn test_cli_parse_migrate_subcommands() {
        for action in ["up", "status", "print"] {
            let cli = Cli::try_parse_from(["lucky", "migrate", action, "--dir", "sql"]);
            assert!(cli.is_ok(), "failed to parse migrate {}", action);
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli =
            Cli::try_parse_from(["lucky", "check", "--config", "custom.toml", "--verbose"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from(["lucky", "serve", "--port", "8080", "--dev"]).unwrap();
        match cli.command {
            Commands::Serve(cmd) => {
                assert_eq!(cmd.port, Some(8080));
                assert!(cmd.dev);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["lucky"]).is_err());
        assert!(Cli::try_parse_from(["lucky", "migrate"]).is_err());
    }
}
