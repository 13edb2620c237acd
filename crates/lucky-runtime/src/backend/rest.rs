use std::time::Duration;

use lucky_core::config::{BackendConfig, KeyRole};
use lucky_core::error::{LuckyError, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use super::{BackendError, BackendErrorKind, BackendResult, BoxFuture, MigrationBackend};

/// Backend speaking the hosted service's PostgREST API under `<url>/rest/v1`.
#[derive(Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    key: String,
    exec_function: String,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    hint: Option<String>,
}

impl RestBackend {
    pub fn new(
        url: &str,
        key: impl Into<String>,
        exec_function: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LuckyError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: key.into(),
            exec_function: exec_function.into(),
        })
    }

    /// Build from configuration using the key for `role`.
    pub fn from_config(config: &BackendConfig, role: KeyRole) -> Result<Self> {
        let creds = config.credentials(role)?;
        Self::new(
            &creds.url,
            creds.key,
            config.exec_function.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        Err(error_from_response(response).await)
    }

    async fn select_names(&self, table: &str, name: Option<&str>) -> BackendResult<Vec<serde_json::Value>> {
        let mut query = vec![("select", "name".to_string()), ("limit", "1".to_string())];
        if let Some(name) = name {
            query.push(("name", format!("eq.{}", name)));
        }

        let response = self
            .send(self.request(Method::GET, table).query(&query))
            .await?;

        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| BackendError::new(BackendErrorKind::Other, e.to_string()))
    }

    /// A 42883 naming the exec procedure itself means it is not installed;
    /// the same code raised from inside a migration is an ordinary failure.
    fn refine_exec_error(&self, mut error: BackendError) -> BackendError {
        let missing_function = error.code.as_deref() == Some("42883")
            && names_function(&error.message, &self.exec_function);
        if missing_function {
            error.kind = BackendErrorKind::ExecUnavailable;
        }
        error
    }
}

/// Whether `message` mentions a call to `function` itself, optionally
/// schema-qualified, and not some longer name ending in it.
fn names_function(message: &str, function: &str) -> bool {
    let needle = format!("{}(", function);
    message.match_indices(&needle).any(|(at, _)| {
        message[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => {
            let mut message = body
                .message
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            if let Some(hint) = body.hint.filter(|h| !h.is_empty()) {
                message = format!("{} ({})", message, hint);
            }
            BackendError::from_code(body.code, message)
        }
        Err(_) => BackendError::from_code(None, format!("HTTP {}: {}", status.as_u16(), text)),
    }
}

impl MigrationBackend for RestBackend {
    fn is_applied<'a>(&'a self, table: &'a str, name: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let rows = self.select_names(table, Some(name)).await?;
            Ok(!rows.is_empty())
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            debug!("Executing statement via rpc/{}", self.exec_function);
            let path = format!("rpc/{}", self.exec_function);
            let request = self
                .request(Method::POST, &path)
                .json(&serde_json::json!({ "sql": sql }));

            self.send(request)
                .await
                .map(|_| ())
                .map_err(|e| self.refine_exec_error(e))
        })
    }

    fn record_applied<'a>(
        &'a self,
        table: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let request = self
                .request(Method::POST, table)
                .header("Prefer", "return=minimal")
                .json(&serde_json::json!({ "name": name }));

            self.send(request).await.map(|_| ())
        })
    }

    fn probe_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.select_names(table, None).await.map(|_| ()) })
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
