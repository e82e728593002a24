//! Session configuration and wire-level protocol constants

use serde::{Deserialize, Serialize};

/// Link relation identifying the push resource.
pub const PUSH_REL: &str = "urn:ietf:params:push";

/// Link relation identifying the receipt subscribe resource.
pub const RECEIPT_REL: &str = "urn:ietf:params:push:receipt";

/// Preference header requesting a non-blocking poll.
pub const PREFER_HEADER: &str = "prefer";

/// Preference value: return "no content" immediately instead of waiting.
pub const PREFER_NON_BLOCKING: &str = "wait=0";

/// Session engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path of the subscribe endpoint on the WebPush server
    #[serde(default = "default_subscribe_path")]
    pub subscribe_path: String,
}

fn default_subscribe_path() -> String {
    "/subscribe".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscribe_path: default_subscribe_path(),
        }
    }
}
