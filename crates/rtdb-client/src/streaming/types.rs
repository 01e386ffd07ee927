//! Types for realtime streams

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// `{path, data}` body of a `put` or `patch` frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payload {
    /// Location relative to the subscription root, e.g. `/` or `/x/v`
    pub path: String,
    /// New value at `path`, JSON `null` for a deletion
    pub data: Value,
}

/// One decoded event off the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Replace the value at `path`
    Put(Payload),
    /// Merge the object in `data` into the value at `path`
    Patch(Payload),
    /// Liveness signal
    KeepAlive,
    /// The server stopped serving this location (security rules denied it)
    Cancel(Option<String>),
    /// The credential used to open the stream expired or was revoked
    AuthRevoked(Option<String>),
}

impl Frame {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            Frame::Put(_) => "put",
            Frame::Patch(_) => "patch",
            Frame::KeepAlive => "keep-alive",
            Frame::Cancel(_) => "cancel",
            Frame::AuthRevoked(_) => "auth_revoked",
        }
    }
}

/// Errors that can occur during streaming
#[derive(Debug, Error)]
pub enum StreamError {
    /// HTTP/connection error
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// Non-HTTP transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to parse a frame
    #[error("Parse error: {0}")]
    Parse(String),

    /// Server answered the stream request with an error status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Server rejected the credential when opening the stream
    #[error("Unauthorized ({status})")]
    Unauthorized { status: u16 },

    /// No bytes arrived within the idle timeout
    #[error("Stream idle timeout")]
    IdleTimeout,

    /// Stream was closed by the server
    #[error("Stream closed")]
    Closed,

    /// Server revoked the credential mid-stream
    #[error("Credential revoked")]
    AuthRevoked,

    /// Server cancelled the stream, read access to the location was lost
    #[error("Stream cancelled by server: {0}")]
    AccessRevoked(String),

    /// A fresh credential could not be obtained
    #[error("Re-authentication failed: {0}")]
    Auth(String),
}

impl StreamError {
    /// Whether the subscription must stop rather than reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Unauthorized { .. } | StreamError::AccessRevoked(_) | StreamError::Auth(_)
        )
    }
}

/// Result type for streaming operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;
