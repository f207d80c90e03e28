//! Client configuration.
//!
//! Resolved once, before the client is built: explicit arguments first, then
//! the `CHATWIRE_API_KEY` / `CHATWIRE_BASE_URL` / `CHATWIRE_MODEL`
//! environment variables. Neither the key nor the base URL has a default.

use std::time::Duration;

use chatwire_core::config::LlmConfig;

use crate::error::{LlmError, Result};
use crate::retry::RetryPolicy;

/// Environment variable holding the bearer token.
pub const API_KEY_ENV: &str = "CHATWIRE_API_KEY";
/// Environment variable holding the base URL.
pub const BASE_URL_ENV: &str = "CHATWIRE_BASE_URL";
/// Environment variable holding the default model.
pub const MODEL_ENV: &str = "CHATWIRE_MODEL";

/// Explicit arguments. `None` means "fall back to the environment"
/// (for the key, URL and model) or "use the built-in default".
#[derive(Clone, Default)]
pub struct ClientArgs {
    /// Bearer token.
    pub api_key: Option<String>,
    /// Base URL or full completions endpoint.
    pub base_url: Option<String>,
    /// Default model.
    pub model: Option<String>,
    /// Default temperature.
    pub temperature: Option<f64>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Retries after the first failure.
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    pub backoff_base: Option<Duration>,
    /// Ceiling for a single backoff delay.
    pub max_backoff: Option<Duration>,
}

impl std::fmt::Debug for ClientArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientArgs")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .field("max_backoff", &self.max_backoff)
            .finish()
    }
}

impl From<&LlmConfig> for ClientArgs {
    fn from(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: Some(config.temperature),
            timeout: Some(Duration::from_millis(config.request_timeout_ms)),
            max_retries: Some(config.max_retries),
            backoff_base: Some(Duration::from_millis(config.backoff_base_ms)),
            max_backoff: config.max_backoff_ms.map(Duration::from_millis),
        }
    }
}

/// Fully resolved client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    base_url: String,
    default_model: Option<String>,
    default_temperature: f64,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
    max_backoff: Option<Duration>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .field("max_backoff", &self.max_backoff)
            .finish()
    }
}

impl ClientConfig {
    /// Default per-attempt timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default retry count.
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    /// Default delay before the first retry.
    pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
    /// Default sampling temperature.
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;

    /// Resolve `args` against the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the API key or base URL is missing
    /// from both the arguments and the environment.
    pub fn from_env(args: ClientArgs) -> Result<Self> {
        Self::resolve(args, |name| std::env::var(name).ok())
    }

    /// Resolve `args`, consulting `env` for values the arguments leave out.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the API key or base URL is missing
    /// from both the arguments and `env`.
    pub fn resolve<F>(args: ClientArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = pick(args.api_key, &env, API_KEY_ENV).ok_or_else(|| {
            LlmError::Config(format!("API key missing: pass one explicitly or set {API_KEY_ENV}"))
        })?;
        let base_url = pick(args.base_url, &env, BASE_URL_ENV).ok_or_else(|| {
            LlmError::Config(format!("base URL missing: pass one explicitly or set {BASE_URL_ENV}"))
        })?;

        Ok(Self {
            api_key,
            base_url,
            default_model: pick(args.model, &env, MODEL_ENV),
            default_temperature: args.temperature.unwrap_or(Self::DEFAULT_TEMPERATURE),
            timeout: args.timeout.unwrap_or(Self::DEFAULT_TIMEOUT),
            max_retries: args.max_retries.unwrap_or(Self::DEFAULT_MAX_RETRIES),
            backoff_base: args.backoff_base.unwrap_or(Self::DEFAULT_BACKOFF_BASE),
            max_backoff: args.max_backoff,
        })
    }

    /// Bearer token.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model used when a call names none.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Temperature used when a call sets none.
    #[must_use]
    pub fn default_temperature(&self) -> f64 {
        self.default_temperature
    }

    /// Retry policy, with `timeout` replacing the configured per-attempt
    /// timeout when given.
    #[must_use]
    pub fn retry_policy(&self, timeout: Option<Duration>) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            max_backoff: self.max_backoff,
            timeout: timeout.unwrap_or(self.timeout),
        }
    }
}

/// Explicit value if non-blank, else the environment value if non-blank.
fn pick<F>(explicit: Option<String>, env: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env(name).filter(|v| !v.trim().is_empty()))
}
