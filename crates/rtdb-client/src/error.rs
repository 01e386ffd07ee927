//! Error types for rtdb client operations

use thiserror::Error;

use crate::config::ConfigError;
use crate::streaming::StreamError;

/// Result type alias for rtdb client operations
pub type Result<T> = std::result::Result<T, RtdbClientError>;

/// Errors that can occur during rtdb client operations
#[derive(Error, Debug)]
pub enum RtdbClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server returned a non-success response
    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Failed to serialize a request body
    #[error("Failed to serialize request: {0}")]
    SerializeError(String),

    /// Path contains segments the store does not accept
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,

    /// Credential could not be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Streaming error
    #[error("Stream error: {0}")]
    StreamError(#[from] StreamError),
}

impl RtdbClientError {
    /// Create a server error from status code and response body
    pub fn server_error(status: u16, body: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            body: body.into(),
        }
    }

    /// HTTP status of a failed request, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
