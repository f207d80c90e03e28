//! Request construction.

use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::error::{LlmError, Result};
use crate::types::{CompletionInput, Message};

/// Per-call overrides of the configured defaults.
///
/// Anything set here wins over the client configuration. `extra` entries are
/// merged into the payload last and may replace any other field.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Model name.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion length limit.
    pub max_tokens: Option<u32>,
    /// Per-attempt timeout for this call.
    pub timeout: Option<Duration>,
    /// Additional provider parameters (`top_p`, `stop`, `user`, …).
    pub extra: Map<String, Value>,
}

impl Overrides {
    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion length limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a provider parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Defaults a request falls back to, taken from the client configuration.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults<'a> {
    /// Configured model, if any.
    pub model: Option<&'a str>,
    /// Configured temperature.
    pub temperature: f64,
}

/// A fully resolved completion request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    messages: Vec<Message>,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    extra: Map<String, Value>,
}

impl CompletionRequest {
    /// Resolve `input` and `overrides` against `defaults`.
    ///
    /// # Errors
    ///
    /// - [`LlmError::InvalidRequest`] when the input has neither messages nor
    ///   a prompt.
    /// - [`LlmError::Config`] when no model is given or configured.
    pub fn build(
        input: CompletionInput,
        overrides: &Overrides,
        defaults: RequestDefaults<'_>,
    ) -> Result<Self> {
        let messages = match (input.messages, input.prompt) {
            (Some(messages), _) => messages,
            (None, Some(prompt)) => vec![Message::user(prompt)],
            (None, None) => {
                return Err(LlmError::InvalidRequest(
                    "either messages or a prompt is required".into(),
                ));
            }
        };

        let model = overrides
            .model
            .as_deref()
            .or(defaults.model)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Config("no model given for the call and none configured".into())
            })?
            .to_string();

        Ok(Self {
            messages,
            model,
            temperature: overrides.temperature.unwrap_or(defaults.temperature),
            max_tokens: overrides.max_tokens,
            extra: overrides.extra.clone(),
        })
    }

    /// Conversation in chat-history order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Resolved model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolved temperature.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Completion length limit, if any.
    #[must_use]
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Additional provider parameters.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// JSON body for the chat-completions endpoint.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("model".into(), json!(self.model));
        payload.insert("messages".into(), json!(self.messages));
        payload.insert("temperature".into(), json!(self.temperature));
        if let Some(max_tokens) = self.max_tokens {
            payload.insert("max_tokens".into(), json!(max_tokens));
        }
        for (key, value) in &self.extra {
            payload.insert(key.clone(), value.clone());
        }
        Value::Object(payload)
    }
}

/// Headers for an authenticated JSON POST.
///
/// # Errors
///
/// Returns [`LlmError::Config`] when `api_key` is blank.
pub fn auth_headers(api_key: &str) -> Result<Vec<(String, String)>> {
    if api_key.trim().is_empty() {
        return Err(LlmError::Config("API key is empty".into()));
    }
    Ok(vec![
        ("Authorization".to_string(), format!("Bearer {}", api_key.trim())),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}
