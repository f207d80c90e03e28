//! Error types for the chatwire support crates.

use thiserror::Error;

/// Top-level error type for configuration and persistence operations.
#[derive(Error, Debug)]
pub enum ChatwireError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ChatwireError {
    fn from(err: config::ConfigError) -> Self {
        ChatwireError::Config(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ChatwireError>;
