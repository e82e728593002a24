//! Push message value type

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::errors::WebPushError;

/// A push message delivered on a monitored subscription.
///
/// The message resource identifies the message on the server and is the
/// path used to acknowledge it. Equality and hashing are defined by the
/// resource alone. A message is assembled incrementally from data frames
/// and is immutable once finalized; an empty payload is a construction
/// error, never a valid message.
#[derive(Debug, Clone)]
pub struct PushMessage {
    resource: String,
    data: String,
    created_at: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
}

impl PushMessage {
    pub(crate) fn new(
        resource: String,
        data: String,
        created_at: Option<DateTime<Utc>>,
        received_at: DateTime<Utc>,
    ) -> Result<Self, WebPushError> {
        if data.is_empty() {
            return Err(WebPushError::Validation(format!(
                "push message {resource} has an empty payload"
            )));
        }
        Ok(Self {
            resource,
            data,
            created_at,
            received_at,
        })
    }

    /// Resource path identifying this message; also its acknowledgement
    /// (DELETE) target.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Message payload, the ordered concatenation of all data frames.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Server-assigned send time, when the response metadata carried one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Client-side receipt time.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl PartialEq for PushMessage {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
    }
}

impl Eq for PushMessage {}

impl Hash for PushMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
    }
}

impl fmt::Display for PushMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PushMessage({}, {} bytes)", self.resource, self.data.len())
    }
}
