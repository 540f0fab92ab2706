use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NodeflowError, Result};

/// Top-level nodeflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Defaults for the networked call executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout when a node config does not set `timeoutMs`.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Treat non-2xx responses as failures unless a node overrides it.
    #[serde(default = "default_fail_on_error_status")]
    pub fail_on_error_status: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            fail_on_error_status: default_fail_on_error_status(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("nodeflow/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fail_on_error_status() -> bool {
    true
}

/// Defaults for the verification retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between lookups.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// REST endpoint backing record lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    #[serde(default = "default_records_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            base_url: default_records_base_url(),
            timeout_ms: default_timeout_ms(),
            bearer_token: None,
        }
    }
}

fn default_records_base_url() -> String {
    "http://localhost:3000/api".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "nodeflow=info,warn".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| NodeflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| NodeflowError::Config(e.to_string()))
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
