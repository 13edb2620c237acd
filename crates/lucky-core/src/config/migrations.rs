use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::migration::SplitMode;

/// Migration runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding `*.sql` files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Bookkeeping table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Statement splitting strategy.
    #[serde(default)]
    pub split_mode: SplitMode,

    /// Create the bookkeeping table before the first migration runs.
    #[serde(default = "default_true")]
    pub create_table: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            table: default_table(),
            split_mode: SplitMode::default(),
            create_table: true,
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table() -> String {
    "_migrations".to_string()
}

fn default_true() -> bool {
    true
}
