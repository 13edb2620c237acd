//! Database backends the migration runner talks to.
//!
//! The runner never owns a global client: each invocation builds one
//! backend and passes it in as `Arc<dyn MigrationBackend>`.

mod postgres;
mod rest;

pub use postgres::PgBackend;
pub use rest::RestBackend;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lucky_core::config::{KeyRole, LuckyConfig};
use lucky_core::error::{LuckyError, Result};
use thiserror::Error;
use tracing::debug;

/// Boxed future returned by backend operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Broad classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Unique constraint violation (SQLSTATE 23505).
    UniqueViolation,
    /// The queried table does not exist.
    UndefinedTable,
    /// The SQL execution procedure is not installed.
    ExecUnavailable,
    /// Network or connection failure.
    Transport,
    Other,
}

/// Error reported by a backend, with the server's code when it sent one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Build an error from a SQLSTATE or PostgREST code, classifying it.
    pub fn from_code(code: Option<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify(code.as_deref(), &message);
        Self {
            kind,
            code,
            message,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Transport, message)
    }

    /// Unclassified failure of a statement.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == BackendErrorKind::UniqueViolation
    }
}

impl From<BackendError> for LuckyError {
    fn from(e: BackendError) -> Self {
        match e.kind {
            BackendErrorKind::ExecUnavailable => LuckyError::ExecUnavailable(e.message),
            _ => LuckyError::Backend(e.message),
        }
    }
}

/// Map a server error code (and, failing that, its message) to a kind.
pub fn classify(code: Option<&str>, message: &str) -> BackendErrorKind {
    match code {
        Some("23505") => BackendErrorKind::UniqueViolation,
        Some("42P01") | Some("PGRST205") | Some("PGRST116") => BackendErrorKind::UndefinedTable,
        Some("PGRST202") => BackendErrorKind::ExecUnavailable,
        _ if message.contains("does not exist") && !message.contains("function") => {
            BackendErrorKind::UndefinedTable
        }
        _ => BackendErrorKind::Other,
    }
}

/// Quote an identifier for interpolation into SQL text.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Operations the migration runner and status probe need from a database.
pub trait MigrationBackend: Send + Sync {
    /// Whether `table` holds a row whose `name` equals `name`.
    fn is_applied<'a>(&'a self, table: &'a str, name: &'a str) -> BoxFuture<'a, BackendResult<bool>>;

    /// Execute one SQL statement (or a multi-statement body, if supported).
    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>>;

    /// Insert a bookkeeping row for `name`.
    fn record_applied<'a>(&'a self, table: &'a str, name: &'a str)
        -> BoxFuture<'a, BackendResult<()>>;

    /// Read at most one row from `table` to check that it is queryable.
    fn probe_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, BackendResult<()>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Build a fresh backend for one invocation.
///
/// A configured direct `DATABASE_URL` wins; otherwise the REST API is used
/// with the key for `role`. Missing credentials fail before any network I/O.
pub async fn connect(config: &LuckyConfig, role: KeyRole) -> Result<Arc<dyn MigrationBackend>> {
    if let Some(url) = config.backend.direct_url() {
        debug!("Using direct Postgres backend");
        let backend = PgBackend::connect(url, config.backend.timeout_secs).await?;
        return Ok(Arc::new(backend));
    }

    let backend = RestBackend::from_config(&config.backend, role)?;
    debug!("Using REST backend at {}", backend.describe());
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_codes() {
        assert_eq!(classify(Some("23505"), ""), BackendErrorKind::UniqueViolation);
        assert_eq!(classify(Some("42P01"), ""), BackendErrorKind::UndefinedTable);
        assert_eq!(classify(Some("PGRST205"), ""), BackendErrorKind::UndefinedTable);
        assert_eq!(classify(Some("PGRST202"), ""), BackendErrorKind::ExecUnavailable);
        assert_eq!(classify(Some("42601"), "syntax error"), BackendErrorKind::Other);
    }

    #[test]
    fn test_classify_by_message() {
        assert_eq!(
            classify(None, "relation \"public._migrations\" does not exist"),
            BackendErrorKind::UndefinedTable
        );
        assert_eq!(
            classify(None, "function public.exec(sql => text) does not exist"),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("_migrations"), "\"_migrations\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_exec_unavailable_converts_to_fatal_error() {
        let err: LuckyError =
            BackendError::new(BackendErrorKind::ExecUnavailable, "no exec").into();
        assert!(matches!(err, LuckyError::ExecUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_without_credentials_fails_fast() {
        let config = LuckyConfig::default();
        let err = connect(&config, KeyRole::Service).await.err().unwrap();
        assert!(matches!(err, LuckyError::MissingCredential(_)));
    }
}
