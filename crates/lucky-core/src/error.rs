use std::path::PathBuf;

use thiserror::Error;

use crate::migration::RunReport;

/// Core error type for migration tooling.
#[derive(Error, Debug)]
pub enum LuckyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing {0} environment variable")]
    MissingCredential(String),

    #[error("Migrations directory not found: {}", .0.display())]
    MigrationsDirNotFound(PathBuf),

    #[error("Exec function unavailable: {0}")]
    ExecUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// A fatal error stopped a run; `report` holds the migrations handled before it.
    #[error("{source}")]
    RunAborted {
        report: RunReport,
        source: Box<LuckyError>,
    },
}

impl LuckyError {
    /// Whether this error means the run never started (bad setup rather than a bad migration).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LuckyError::Config(_)
                | LuckyError::MissingCredential(_)
                | LuckyError::MigrationsDirNotFound(_)
        )
    }

    /// The error that stopped the run, looking through `RunAborted`.
    pub fn root_cause(&self) -> &LuckyError {
        match self {
            LuckyError::RunAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Split into the results gathered before the failure and its cause.
    pub fn into_partial(self) -> (RunReport, LuckyError) {
        match self {
            LuckyError::RunAborted { report, source } => (report, *source),
            other => (RunReport::default(), other),
        }
    }
}

impl From<serde_json::Error> for LuckyError {
    fn from(e: serde_json::Error) -> Self {
        LuckyError::Serialization(e.to_string())
    }
}

/// Result type alias using LuckyError.
pub type Result<T> = std::result::Result<T, LuckyError>;
