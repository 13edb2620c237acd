//! Runtime for the lucky migration tooling: database backends, the shared
//! migration runner and status probe, and the HTTP gateway that exposes them.

pub mod backend;
pub mod gateway;
pub mod migrations;
pub mod testing;

pub use backend::{connect, BackendError, BackendErrorKind, MigrationBackend, PgBackend, RestBackend};
pub use gateway::{GatewayServer, MigrateResponse};
pub use migrations::{load_migrations, probe_status, MigrationRunner, RunnerOptions};
