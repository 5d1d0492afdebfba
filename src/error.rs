//! Structured error types for devbridge
//!
//! Using thiserror for automatic Display implementation and error chaining.

use crate::gate::Operation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("channel '{channel}' is not allowed for {operation}")]
    ChannelNotAllowed { channel: String, operation: Operation },

    #[error("no handler registered for channel '{0}'")]
    NoHandler(String),

    #[error("a handler is already registered for channel '{0}'")]
    DuplicateHandler(String),

    /// Failure raised by a user handler, passed through untouched
    #[error(transparent)]
    Handler(anyhow::Error),

    #[error("invalid allow-list pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to install logger: {0}")]
    LoggerInstall(String),

    #[error("performance sampling unavailable: {0}")]
    Sampler(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Returns the original handler failure, if this is one
    pub fn as_handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            BridgeError::Handler(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
