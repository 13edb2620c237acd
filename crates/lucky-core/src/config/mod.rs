mod backend;
mod migrations;
mod observability;
mod server;

pub use backend::{
    BackendConfig, KeyRole, RestCredentials, ANON_KEY_VAR, BACKEND_URL_VAR, DATABASE_URL_VAR,
    SERVICE_KEY_VAR,
};
pub use migrations::MigrationsConfig;
pub use observability::{LogFormat, ObservabilityConfig};
pub use server::{Environment, ServerConfig, ENVIRONMENT_VAR};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{LuckyError, Result};

/// Root configuration, read from `lucky.toml` and the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LuckyConfig {
    /// Hosted backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Migration runner settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl LuckyConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LuckyError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| LuckyError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load `path` if it exists (defaults otherwise), then overlay the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            debug!("Loading configuration from {}", path.display());
            Self::from_file(path)?
        } else {
            debug!(
                "No configuration file at {}, using environment only",
                path.display()
            );
            Self::default()
        };

        config.apply_env(&|var| std::env::var(var).ok());
        Ok(config)
    }

    /// Overlay environment values: backend fields fill gaps, the environment name always wins.
    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        self.backend.fill_from(lookup);
        if let Some(env) = lookup(ENVIRONMENT_VAR).filter(|v| !v.is_empty()) {
            self.server.environment = Environment::from_name(&env);
        }
    }
}

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
