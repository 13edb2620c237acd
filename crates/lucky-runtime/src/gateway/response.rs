use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lucky_core::config::SERVICE_KEY_VAR;
use lucky_core::error::LuckyError;
use lucky_core::migration::{MigrationResult, RunReport};
use serde::{Deserialize, Serialize};

/// Body of a successful `GET /api/migrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateResponse {
    pub message: String,
    pub results: Vec<MigrationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MigrateResponse {
    pub fn empty() -> Self {
        Self {
            message: "No migration files found".to_string(),
            results: Vec::new(),
            note: None,
        }
    }

    pub fn completed(report: RunReport) -> Self {
        Self {
            message: "Migrations completed".to_string(),
            results: report.results,
            note: Some(
                "If migrations failed, you may need to run them manually in the database SQL editor"
                    .to_string(),
            ),
        }
    }
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response of the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MigrationResult>>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            instructions: None,
            details: None,
            results: None,
        }
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    /// A fatal error raised by the runner after setup succeeded, with the
    /// results of the migrations handled before it.
    pub fn migration_failed(details: impl Into<String>, results: Vec<MigrationResult>) -> Self {
        let mut err = Self::internal("Migration failed");
        err.details = Some(details.into());
        err.results = Some(results);
        err
    }

    /// Map an error from building the backend to a response.
    pub fn from_setup_error(e: LuckyError) -> Self {
        match e {
            LuckyError::MissingCredential(var) if var == SERVICE_KEY_VAR => {
                let mut err = Self::internal(format!("Missing {} environment variable", var));
                err.instructions = Some(format!(
                    "Add {} to your .env file. It is the service role key listed in the backend project's API settings.",
                    var
                ));
                err
            }
            other => Self::internal(other.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
