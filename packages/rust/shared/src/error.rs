//! Error types for Curator.
//!
//! Library crates use [`CuratorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Curator operations.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    /// Transport-level failure: the request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-2xx status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A dataset (or other entity) could not be resolved locally.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A client-side precondition failed before any request was issued.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A response body did not match the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CuratorError>;

impl CuratorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error describing what was looked up.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a server error from an HTTP status and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Human-readable message stored in the stores' error slots.
    ///
    /// Server errors surface the service's own message without the status prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { message, .. } => message.clone(),
            Self::Network(msg) => msg.clone(),
            Self::NotFound { what } => format!("{what} not found"),
            Self::Validation { message } | Self::Parse { message } | Self::Config { message } => {
                message.clone()
            }
            Self::Io { .. } => self.to_string(),
        }
    }
}
