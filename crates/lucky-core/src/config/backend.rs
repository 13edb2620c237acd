use serde::{Deserialize, Serialize};

use crate::error::{LuckyError, Result};

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_VAR: &str = "LUCKY_BACKEND_URL";
/// Environment variable holding the public (anon) API key.
pub const ANON_KEY_VAR: &str = "LUCKY_ANON_KEY";
/// Environment variable holding the privileged service key.
pub const SERVICE_KEY_VAR: &str = "LUCKY_SERVICE_KEY";
/// Environment variable holding a direct Postgres connection URL.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Which API key a caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Public key, used by the CLI and the status probe.
    Anon,
    /// Privileged key, required by the HTTP migrate endpoint.
    Service,
}

impl KeyRole {
    /// Environment variable that supplies this key.
    pub fn env_var(&self) -> &'static str {
        match self {
            KeyRole::Anon => ANON_KEY_VAR,
            KeyRole::Service => SERVICE_KEY_VAR,
        }
    }
}

/// Backend-as-a-service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (the REST API lives under `/rest/v1`).
    pub url: Option<String>,

    /// Public key.
    pub anon_key: Option<String>,

    /// Privileged key.
    pub service_key: Option<String>,

    /// Direct Postgres URL. When set, migrations bypass the REST API.
    pub database_url: Option<String>,

    /// Remote procedure used to execute arbitrary SQL.
    #[serde(default = "default_exec_function")]
    pub exec_function: String,

    /// HTTP/connect timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            service_key: None,
            database_url: None,
            exec_function: default_exec_function(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_exec_function() -> String {
    "exec".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Credentials for the REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestCredentials {
    pub url: String,
    pub key: String,
}

impl BackendConfig {
    /// Resolve URL and key for `role`, failing before any I/O if either is missing.
    pub fn credentials(&self, role: KeyRole) -> Result<RestCredentials> {
        let url = non_empty(&self.url)
            .ok_or_else(|| LuckyError::MissingCredential(BACKEND_URL_VAR.to_string()))?;
        let key = match role {
            KeyRole::Anon => non_empty(&self.anon_key),
            KeyRole::Service => non_empty(&self.service_key),
        }
        .ok_or_else(|| LuckyError::MissingCredential(role.env_var().to_string()))?;

        Ok(RestCredentials {
            url: url.to_string(),
            key: key.to_string(),
        })
    }

    pub fn direct_url(&self) -> Option<&str> {
        non_empty(&self.database_url)
    }

    /// Names of the variables that `role` needs but are unset.
    pub fn missing_for(&self, role: KeyRole) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if non_empty(&self.url).is_none() {
            missing.push(BACKEND_URL_VAR);
        }
        let key = match role {
            KeyRole::Anon => &self.anon_key,
            KeyRole::Service => &self.service_key,
        };
        if non_empty(key).is_none() {
            missing.push(role.env_var());
        }
        missing
    }

    /// Fill unset fields from `lookup`.
    pub(crate) fn fill_from(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        fill(&mut self.url, lookup(BACKEND_URL_VAR));
        fill(&mut self.anon_key, lookup(ANON_KEY_VAR));
        fill(&mut self.service_key, lookup(SERVICE_KEY_VAR));
        fill(&mut self.database_url, lookup(DATABASE_URL_VAR));
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if non_empty(slot).is_none() {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            *slot = Some(v);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
