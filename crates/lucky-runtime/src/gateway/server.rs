use std::sync::Arc;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use lucky_core::config::{KeyRole, LuckyConfig};
use lucky_core::error::Result;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use super::handlers::{health_handler, migrate_handler, status_handler};
use crate::backend::{self, BoxFuture, MigrationBackend};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds a fresh backend for each request.
pub type BackendFactory = Arc<
    dyn Fn(&LuckyConfig, KeyRole) -> BoxFuture<'static, Result<Arc<dyn MigrationBackend>>>
        + Send
        + Sync,
>;

/// Shared handler state.
pub struct GatewayState {
    pub config: Arc<LuckyConfig>,
    pub factory: BackendFactory,
}

/// Factory that connects to the configured backend.
pub fn default_factory() -> BackendFactory {
    Arc::new(
        |config: &LuckyConfig, role: KeyRole| -> BoxFuture<'static, Result<Arc<dyn MigrationBackend>>> {
            let config = config.clone();
            Box::pin(async move { backend::connect(&config, role).await })
        },
    )
}

/// HTTP server exposing the migrate and status endpoints.
pub struct GatewayServer {
    config: Arc<LuckyConfig>,
    factory: BackendFactory,
}

impl GatewayServer {
    pub fn new(config: LuckyConfig) -> Self {
        Self {
            config: Arc::new(config),
            factory: default_factory(),
        }
    }

    /// Replace how backends are built (tests hand in an in-memory one).
    pub fn with_factory(mut self, factory: BackendFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Build the Axum router.
    pub fn router(&self) -> Router {
        let state = Arc::new(GatewayState {
            config: self.config.clone(),
            factory: self.factory.clone(),
        });

        Router::new()
            .route("/health", get(health_handler))
            .route("/api/migrate", get(migrate_handler))
            .route("/api/status", get(status_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(&self.config.server.cors_origins))
                    .layer(middleware::from_fn(request_id_middleware)),
            )
    }

    /// Address to bind, as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.addr();
        let router = self.router();

        if self.config.server.environment.is_development() {
            tracing::info!("Migration endpoint enabled at /api/migrate (development)");
        } else {
            tracing::info!("Migration endpoint disabled outside development");
        }

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Gateway server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Propagate or assign a request id and run the request inside a span carrying it.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use lucky_core::config::Environment;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn dev_config(dir: &std::path::Path) -> LuckyConfig {
        let mut config = LuckyConfig::default();
        config.server.environment = Environment::Development;
        config.migrations.dir = dir.to_path_buf();
        config
    }

    fn memory_factory(backend: MemoryBackend) -> BackendFactory {
        Arc::new(
            move |_config: &LuckyConfig,
                  _role: KeyRole|
                  -> BoxFuture<'static, Result<Arc<dyn MigrationBackend>>> {
                let backend = backend.clone();
                Box::pin(async move { Ok(Arc::new(backend) as Arc<dyn MigrationBackend>) })
            },
        )
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_migrate_forbidden_outside_development() {
        let backend = MemoryBackend::new();
        let server =
            GatewayServer::new(LuckyConfig::default()).with_factory(memory_factory(backend.clone()));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["error"],
            "Migrations can only be run in development mode or with proper authentication"
        );
        assert!(backend.executed().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_without_service_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        let mut config = dev_config(dir.path());
        config.backend.url = Some("http://127.0.0.1:9".to_string());
        config.backend.anon_key = Some("anon".to_string());

        let (status, body) = get(GatewayServer::new(config).router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Missing LUCKY_SERVICE_KEY environment variable");
        assert!(body["instructions"].is_string());
    }

    #[tokio::test]
    async fn test_migrate_runs_pending_migrations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("002_b.sql"), "SELECT 2;").unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        let backend = MemoryBackend::new().with_table("_migrations", &["001_a.sql"]);
        let server = GatewayServer::new(dev_config(dir.path()))
            .with_factory(memory_factory(backend.clone()));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Migrations completed");
        assert_eq!(
            body["results"],
            json!([
                {"name": "001_a.sql", "status": "skipped"},
                {"name": "002_b.sql", "status": "completed"},
            ])
        );
        assert!(body["note"].is_string());
        assert_eq!(backend.recorded("_migrations"), vec!["001_a.sql", "002_b.sql"]);
    }

    #[tokio::test]
    async fn test_migrate_reports_failed_migration_with_200() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "BROKEN;").unwrap();
        let backend = MemoryBackend::new().fail_statements_containing(
            "BROKEN",
            crate::backend::BackendError::statement("syntax error"),
        );
        let server =
            GatewayServer::new(dev_config(dir.path())).with_factory(memory_factory(backend));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["results"],
            json!([{"name": "001_a.sql", "status": "failed", "error": "syntax error"}])
        );
    }

    #[tokio::test]
    async fn test_migrate_with_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let server = GatewayServer::new(dev_config(dir.path()))
            .with_factory(memory_factory(MemoryBackend::new()));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"message": "No migration files found", "results": []})
        );
    }

    #[tokio::test]
    async fn test_migrate_with_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let server = GatewayServer::new(dev_config(&dir.path().join("migrations")))
            .with_factory(memory_factory(MemoryBackend::new()));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Migrations directory not found. Please create a \"migrations\" folder in your project root."
        );
    }

    #[tokio::test]
    async fn test_migrate_without_exec_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        let server = GatewayServer::new(dev_config(dir.path()))
            .with_factory(memory_factory(MemoryBackend::new().without_exec()));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Migration failed");
        assert!(body["details"].is_string());
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn test_migrate_failure_returns_results_so_far() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.path().join("002_b.sql"), "SELECT 2;").unwrap();
        let mut config = dev_config(dir.path());
        config.migrations.create_table = false;
        let backend = MemoryBackend::new()
            .with_table("_migrations", &["001_a.sql"])
            .without_exec();
        let server = GatewayServer::new(config).with_factory(memory_factory(backend));

        let (status, body) = get(server.router(), "/api/migrate").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Migration failed");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .starts_with("Exec function unavailable"));
        assert_eq!(
            body["results"],
            json!([{"name": "001_a.sql", "status": "skipped"}])
        );
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let server = GatewayServer::new(LuckyConfig::default())
            .with_factory(memory_factory(MemoryBackend::new()));
        let (status, body) = get(server.router(), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "needs-setup", "message": "Database needs initialization"})
        );

        let server = GatewayServer::new(LuckyConfig::default()).with_factory(memory_factory(
            MemoryBackend::new().with_table("_migrations", &[]),
        ));
        let (_, body) = get(server.router(), "/api/status").await;
        assert_eq!(body, json!({"status": "ready", "message": "Database is ready"}));
    }

    #[tokio::test]
    async fn test_status_without_credentials_is_error() {
        let (status, body) =
            get(GatewayServer::new(LuckyConfig::default()).router(), "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["message"],
            "Database error: Missing LUCKY_BACKEND_URL environment variable"
        );
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let router = GatewayServer::new(LuckyConfig::default()).router();
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[test]
    fn test_addr() {
        let server = GatewayServer::new(LuckyConfig::default());
        assert_eq!(server.addr(), "127.0.0.1:3000");
    }
}
