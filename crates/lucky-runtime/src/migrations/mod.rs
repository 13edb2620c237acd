mod loader;
mod runner;
mod splitter;
mod status;

pub use loader::load_migrations;
pub use runner::{MigrationRunner, PlannedMigration, RunnerOptions};
pub use splitter::{split_naive, split_quoted, split_statements};
pub use status::probe_status;
