//! Core types for the lucky migration tooling: errors, configuration and the
//! migration data model shared by the runner, the HTTP gateway and the CLI.

pub mod config;
pub mod error;
pub mod migration;

pub use config::{KeyRole, LuckyConfig};
pub use error::{LuckyError, Result};
pub use migration::{
    DatabaseStatus, Migration, MigrationResult, MigrationStatus, RunReport, SplitMode,
};
