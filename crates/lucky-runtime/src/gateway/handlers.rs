use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lucky_core::config::KeyRole;
use lucky_core::error::LuckyError;
use lucky_core::migration::DatabaseStatus;
use tracing::{error, warn};

use super::response::{ApiError, HealthResponse, MigrateResponse, StatusResponse};
use super::server::GatewayState;
use crate::migrations::{load_migrations, probe_status, MigrationRunner, RunnerOptions};

/// `GET /api/migrate`: run pending migrations with the service key.
///
/// Refused outside development. Missing credentials or a missing
/// migrations directory answer 500 before anything is executed.
pub async fn migrate_handler(State(state): State<Arc<GatewayState>>) -> Response {
    if !state.config.server.environment.is_development() {
        warn!("Rejected migration request outside development");
        return ApiError::forbidden(
            "Migrations can only be run in development mode or with proper authentication",
        )
        .into_response();
    }

    let backend = match (state.factory)(state.config.as_ref(), KeyRole::Service).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("Cannot build backend for migrations: {}", e);
            return ApiError::from_setup_error(e).into_response();
        }
    };

    let dir = state.config.migrations.dir.clone();
    let loaded = match tokio::task::spawn_blocking(move || load_migrations(&dir)).await {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Migration loading task failed: {}", e);
            return ApiError::internal("Failed to read migration files").into_response();
        }
    };

    let migrations = match loaded {
        Ok(migrations) => migrations,
        Err(LuckyError::MigrationsDirNotFound(_)) => {
            return ApiError::internal(
                "Migrations directory not found. Please create a \"migrations\" folder in your project root.",
            )
            .into_response();
        }
        Err(e) => return ApiError::internal(e.to_string()).into_response(),
    };

    if migrations.is_empty() {
        return Json(MigrateResponse::empty()).into_response();
    }

    let runner = MigrationRunner::new(backend, RunnerOptions::from(&state.config.migrations));
    match runner.run_migrations(migrations).await {
        Ok(report) => Json(MigrateResponse::completed(report)).into_response(),
        Err(e) => {
            error!("Migration error: {}", e);
            let (report, cause) = e.into_partial();
            ApiError::migration_failed(cause.to_string(), report.results).into_response()
        }
    }
}

/// `GET /api/status`: classify the database with the public key.
pub async fn status_handler(State(state): State<Arc<GatewayState>>) -> Json<StatusResponse> {
    let status = match (state.factory)(state.config.as_ref(), KeyRole::Anon).await {
        Ok(backend) => probe_status(backend.as_ref(), &state.config.migrations.table).await,
        Err(e) => DatabaseStatus::Error(e.to_string()),
    };

    Json(StatusResponse {
        status: status.label().to_string(),
        message: status.message(),
    })
}

/// `GET /health`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
