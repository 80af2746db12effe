//! Error types for ipsync
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for ipsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ipsync
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP errors (connection refused, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication errors (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// A value in an otherwise well-formed response cannot be represented
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// Backend answered with a status other than the one the operation expects
    #[error("{backend} returned unexpected status {status} in {operation}: {body}")]
    UnexpectedStatus {
        /// Backend name
        backend: String,
        /// Operation that issued the request
        operation: String,
        /// HTTP status code
        status: u16,
        /// Raw response body (may be empty)
        body: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a data shape error
    pub fn data_shape(msg: impl Into<String>) -> Self {
        Self::DataShape(msg.into())
    }

    /// Map a non-expected HTTP status to an error
    ///
    /// 401 and 403 become [`Error::Authentication`]; everything else keeps the
    /// raw status and body so an operator can remediate by hand.
    pub fn unexpected_status(
        backend: impl Into<String>,
        operation: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        let backend = backend.into();
        let operation = operation.into();
        match status {
            401 | 403 => Self::auth(format!(
                "{} rejected the token in {} (status {})",
                backend, operation, status
            )),
            _ => Self::UnexpectedStatus {
                backend,
                operation,
                status,
                body: body.into(),
            },
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
