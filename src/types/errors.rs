//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Caller
//! errors (`NotFound`, `Validation`) are turned into structured results at the
//! registry tool boundary; nothing here is meant to unwind past it.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the switchboard core.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed arguments or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown operation, server or tool.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal errors, including recovered handler panics.
    #[error("internal error: {0}")]
    Internal(String),

    /// A deadline elapsed (probe checks, endpoint probes).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP errors from endpoint probes.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Stable machine-readable code for structured error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Internal(_) => "INTERNAL",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Serialization(_) => "INTERNAL",
            Error::Io(_) => "INTERNAL",
            Error::Http(_) => "UNAVAILABLE",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
