//! Request and response types for rtdb client

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response to a `push`: the key the server generated for the new child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub name: String,
}

/// Security rules document stored at `/.settings/rules.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRules {
    pub rules: Value,
}

impl DatabaseRules {
    pub fn new(rules: Value) -> Self {
        Self { rules }
    }
}
