//! Error types for the stockwatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for stockwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the stockwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Inventory source errors (transport, status, payload)
    #[error("Inventory source error: {0}")]
    Source(String),

    /// History store errors
    #[error("History store error: {0}")]
    HistoryStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// An external call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Channel-specific error
    #[error("Channel error ({channel}): {message}")]
    Channel {
        /// Channel name
        channel: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create an inventory source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a history store error
    pub fn history_store(msg: impl Into<String>) -> Self {
        Self::HistoryStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a channel-specific error
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }
}
