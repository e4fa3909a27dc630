//! Environment-backed configuration.
//!
//! All settings can be overridden via environment variables with a
//! `JUPYTER_` prefix, e.g. `JUPYTER_SERVER_URL=http://localhost:8888`.

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Proxy configuration: plain values that parameterize the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Base URL of the remote kernel server.
    pub server_url: String,
    /// Opaque bearer credential; empty means unauthenticated.
    pub token: String,
    /// Connect timeout for HTTP calls, in seconds.
    pub timeout_connect: f64,
    /// Total timeout for HTTP calls, in seconds.
    pub timeout_total: f64,
    /// Sleep between reconnection attempts, in seconds.
    pub retry_sleep: f64,
    /// Reconnection attempt budget; `None` retries until shutdown.
    pub retry_budget: Option<u32>,
    /// Bind address for the front-door HTTP server.
    pub listen_addr: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            token: String::new(),
            timeout_connect: 10.0,
            timeout_total: 30.0,
            retry_sleep: 30.0,
            retry_budget: None,
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ProxySettings {
    /// Load settings from `JUPYTER_`-prefixed environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// # Errors
    /// Returns an error if a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("JUPYTER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// WebSocket base URL derived from `server_url`.
    #[must_use]
    pub fn ws_base(&self) -> String {
        if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server_url.clone()
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_connect.max(0.0))
    }

    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_total.max(0.0))
    }

    #[must_use]
    pub fn retry_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.retry_sleep.max(0.0))
    }
}
