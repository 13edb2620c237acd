use lucky_core::migration::DatabaseStatus;
use tracing::debug;

use crate::backend::{BackendErrorKind, MigrationBackend};

/// Classify the database by reading the bookkeeping table once.
///
/// Missing table means setup is needed; any other failure is a generic error.
pub async fn probe_status(backend: &dyn MigrationBackend, table: &str) -> DatabaseStatus {
    match backend.probe_table(table).await {
        Ok(()) => DatabaseStatus::Ready,
        Err(e) if e.kind == BackendErrorKind::UndefinedTable => {
            debug!("Bookkeeping table {} not found: {}", table, e);
            DatabaseStatus::NeedsSetup
        }
        Err(e) => DatabaseStatus::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, BoxFuture};
    use crate::testing::MemoryBackend;

    #[tokio::test]
    async fn test_ready_when_table_exists() {
        let backend = MemoryBackend::new().with_table("_migrations", &[]);
        assert_eq!(
            probe_status(&backend, "_migrations").await,
            DatabaseStatus::Ready
        );
    }

    #[tokio::test]
    async fn test_needs_setup_when_table_missing() {
        let backend = MemoryBackend::new();
        let status = probe_status(&backend, "_migrations").await;
        assert_eq!(status, DatabaseStatus::NeedsSetup);
        assert_eq!(status.message(), "Database needs initialization");
    }

    #[tokio::test]
    async fn test_other_failures_are_errors() {
        struct Unreachable;

        impl MigrationBackend for Unreachable {
            fn is_applied<'a>(
                &'a self,
                _table: &'a str,
                _name: &'a str,
            ) -> BoxFuture<'a, BackendResult<bool>> {
                Box::pin(async { Ok(false) })
            }

            fn execute<'a>(
                &'a self,
                _sql: &'a str,
            ) -> BoxFuture<'a, BackendResult<()>> {
                Box::pin(async { Ok(()) })
            }

            fn record_applied<'a>(
                &'a self,
                _table: &'a str,
                _name: &'a str,
            ) -> BoxFuture<'a, BackendResult<()>> {
                Box::pin(async { Ok(()) })
            }

            fn probe_table<'a>(
                &'a self,
                _table: &'a str,
            ) -> BoxFuture<'a, BackendResult<()>> {
                Box::pin(async {
                    Err(BackendError::transport(
                        "error sending request: connection refused",
                    ))
                })
            }

            fn describe(&self) -> String {
                "unreachable".to_string()
            }
        }

        let status = probe_status(&Unreachable, "_migrations").await;
        assert_eq!(status.label(), "error");
        assert_eq!(
            status.message(),
            "Database error: error sending request: connection refused"
        );
    }
}
