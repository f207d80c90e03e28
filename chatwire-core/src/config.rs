//! Configuration for chatwire.
//!
//! Maps directly to `chatwire.toml`. Every value can be overridden through
//! environment variables of the form `CHATWIRE__SECTION__KEY`, for example
//! `CHATWIRE__LLM__MAX_RETRIES=5`.
//!
//! The provider credentials (`llm.api_key`, `llm.base_url`) deliberately have
//! no defaults. When they are absent here the client falls back to the
//! `CHATWIRE_API_KEY` / `CHATWIRE_BASE_URL` variables, and fails if those are
//! missing too.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChatwireError, Result};

/// Prefix for environment overrides of the file configuration.
pub const ENV_PREFIX: &str = "CHATWIRE";

/// Top-level chatwire configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatwireConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Provider client settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Diagnostic server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Counter store settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ChatwireConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ChatwireError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ChatwireError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from an optional TOML file layered with
    /// `CHATWIRE__SECTION__KEY` overrides from the process environment.
    ///
    /// # Errors
    /// Returns `ChatwireError::Config` if the file is missing or a value has
    /// the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`ChatwireConfig::load`], but reads overrides from `env`
    /// instead of the process environment when it is `Some`.
    ///
    /// # Errors
    /// Returns `ChatwireError::Config` if the file is missing or a value has
    /// the wrong type.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<::config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::new(
                &path.to_string_lossy(),
                ::config::FileFormat::Toml,
            ));
        }

        let overrides = ::config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config = builder
            .add_source(overrides)
            .build()?
            .try_deserialize::<Self>()?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Provider client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Bearer token for the provider. No default.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Provider base URL (or full completions endpoint). No default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model used when a call does not name one.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature used when a call does not set one.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Optional ceiling for a single backoff delay.
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            temperature: default_temperature(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_2(),
            backoff_base_ms: default_backoff_base(),
            max_backoff_ms: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .finish()
    }
}

/// Diagnostic HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-attempt timeout for the diagnostic completion call.
    #[serde(default = "default_diagnostic_timeout")]
    pub diagnostic_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            diagnostic_timeout_ms: default_diagnostic_timeout(),
        }
    }
}

/// Counter store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Daily counters older than this many days are removed on cleanup.
    #[serde(default = "default_7")]
    pub counter_retention_days: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            counter_retention_days: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_db_path() -> String { "chatwire.db".to_string() }
fn default_temperature() -> f64 { 0.7 }
fn default_2() -> u32 { 2 }
fn default_7() -> u32 { 7 }
fn default_port() -> u16 { 8080 }
fn default_backoff_base() -> u64 { 500 }
fn default_diagnostic_timeout() -> u64 { 10_000 }
fn default_request_timeout() -> u64 { 60_000 }
