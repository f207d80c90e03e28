//! Client error types.

use thiserror::Error;

/// Errors returned by a completion call.
///
/// Unparseable or unrecognised response bodies are not errors: they are
/// normalised into a best-effort result instead.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing API key, base URL or model. Raised before any I/O.
    #[error("LLM configuration error: {0}")]
    Config(String),

    /// The call carried neither a message sequence nor a prompt.
    #[error("Invalid completion request: {0}")]
    InvalidRequest(String),

    /// The provider host did not resolve. Raised before the first attempt.
    #[error("Cannot resolve provider host '{host}' for {url}: {reason}")]
    Resolution {
        /// Endpoint the request would have been sent to.
        url: String,
        /// Host extracted from the configured base URL.
        host: String,
        /// Resolver message.
        reason: String,
    },

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries against {url} (host {host}): {last_error}")]
    RetriesExhausted {
        /// Endpoint the request was sent to.
        url: String,
        /// Host part of `url`.
        host: String,
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the final attempt.
        #[source]
        last_error: TransportFailure,
    },

    /// The caller cancelled the call between attempts.
    #[error("LLM request to {url} (host {host}) cancelled after {attempts} attempts")]
    Cancelled {
        /// Endpoint the request was sent to.
        url: String,
        /// Host part of `url`.
        host: String,
        /// Number of attempts made before cancellation.
        attempts: u32,
    },
}

/// A single failed attempt. Every variant is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The provider answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The attempt did not finish within the per-attempt timeout.
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Configured per-attempt timeout.
        after_ms: u64,
    },

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport-level failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportFailure {
    /// Longest response body kept in a [`TransportFailure::Status`].
    pub const MAX_BODY_CHARS: usize = 512;

    /// Build a status failure, truncating the body.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        TransportFailure::Status {
            status,
            body: body.chars().take(Self::MAX_BODY_CHARS).collect(),
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportFailure::Timeout { after_ms: 0 }
        } else if err.is_connect() {
            TransportFailure::Connect(err.to_string())
        } else {
            TransportFailure::Request(err.to_string())
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LlmError>;
