//! Client configuration with YAML support

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::{BackoffPolicy, PatchMerge};

/// rtdb client configuration
///
/// Can be loaded from YAML, JSON, or constructed programmatically.
///
/// ```yaml
/// connection:
///   base_url: "https://example.firebaseio.com"
///   auth_secret: "secret"  # optional
///
/// timeouts:
///   request_ms: 30000
///   connect_ms: 10000
///
/// streaming:
///   initial_backoff_ms: 500
///   max_backoff_ms: 30000
///   patch_merge: shallow
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtdbConfig {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// Timeout settings for one-shot requests
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Realtime stream settings
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the store, with or without a trailing slash
    pub base_url: String,

    /// Database secret or ID token, sent as the `auth` query parameter
    #[serde(default)]
    pub auth_secret: Option<String>,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// General request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

/// Realtime stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// First reconnect delay in milliseconds (default: 500ms)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds (default: 30s)
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Growth factor applied after each failed attempt (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Reconnect when no bytes (not even a keep-alive) arrive for this long.
    /// Zero disables the check. (default: 90s)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// How `patch` frames are merged into cached values
    #[serde(default)]
    pub patch_merge: PatchMerge,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            idle_timeout_ms: default_idle_timeout(),
            patch_merge: PatchMerge::default(),
        }
    }
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_idle_timeout() -> u64 {
    90_000 // server keep-alives arrive every ~30s
}

impl StreamingConfig {
    /// Reconnect policy described by this configuration
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.backoff_multiplier,
        )
    }

    /// Idle read timeout, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

impl RtdbConfig {
    /// Minimal configuration for a base URL with default timeouts
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig {
                base_url: base_url.into(),
                auth_secret: None,
            },
            timeouts: TimeoutsConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(base_url: impl Into<String>) -> RtdbConfigBuilder {
        RtdbConfigBuilder::new(base_url)
    }

    /// One-shot request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    /// TCP connect timeout, shared by one-shot and streaming requests
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }
}

/// Builder for [`RtdbConfig`]
#[derive(Debug, Clone)]
pub struct RtdbConfigBuilder {
    config: RtdbConfig,
}

impl RtdbConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: RtdbConfig::new(base_url),
        }
    }

    /// Set the auth secret sent with every request
    pub fn auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.connection.auth_secret = Some(secret.into());
        self
    }

    /// Set the one-shot request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.request_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.connect_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the reconnect delay bounds
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.streaming.initial_backoff_ms = initial.as_millis() as u64;
        self.config.streaming.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Set the idle read timeout for streams (zero disables it)
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.streaming.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Choose how `patch` frames merge into cached values
    pub fn patch_merge(mut self, merge: PatchMerge) -> Self {
        self.config.streaming.patch_merge = merge;
        self
    }

    pub fn build(self) -> RtdbConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
