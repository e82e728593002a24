//! Per-stream push message assembly state machine

use chrono::{DateTime, Utc};
use http::header::DATE;
use http::HeaderMap;

use crate::errors::WebPushError;
use crate::message::PushMessage;

/// Explicit tagged state of one in-progress delivery.
///
/// A monitoring stream delivers one message at a time:
/// `Idle` → announcement → `Announced` → metadata → `MetadataReceived`
/// → final data frame → back to `Idle`. Data frames are accepted in both
/// announced states; metadata may be skipped by a server that sends data
/// directly after the announcement.
#[derive(Debug)]
enum AssemblerState {
    Idle,
    Announced {
        resource: String,
        data: String,
    },
    MetadataReceived {
        resource: String,
        data: String,
        created_at: Option<DateTime<Utc>>,
        received_at: DateTime<Utc>,
    },
}

/// Assembles push messages from the ordered event sequence of one
/// monitoring stream.
///
/// The assembler holds at most one message in flight: the transport is
/// expected to serialize announcement, metadata, and data for one message
/// before starting the next on a given stream. Events arriving out of
/// that order are protocol violations and leave the current state
/// untouched.
#[derive(Debug)]
pub struct PushMessageAssembler {
    state: AssemblerState,
}

impl Default for PushMessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PushMessageAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblerState::Idle,
        }
    }

    /// Whether no delivery is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, AssemblerState::Idle)
    }

    /// Start assembling the message announced under `resource`.
    pub fn on_announcement(&mut self, resource: String) -> Result<(), WebPushError> {
        match self.state {
            AssemblerState::Idle => {
                self.state = AssemblerState::Announced {
                    resource,
                    data: String::new(),
                };
                Ok(())
            }
            _ => Err(WebPushError::Protocol(format!(
                "push announcement for {resource} while another message is in progress"
            ))),
        }
    }

    /// Record response metadata for the announced message.
    ///
    /// "No content" statuses never reach the assembler; the engine
    /// intercepts them before dispatch.
    pub fn on_metadata(&mut self, headers: &HeaderMap) -> Result<(), WebPushError> {
        match std::mem::replace(&mut self.state, AssemblerState::Idle) {
            AssemblerState::Idle => Err(WebPushError::Protocol(
                "response metadata arrived with no announced message".into(),
            )),
            AssemblerState::Announced { resource, data } => {
                self.state = AssemblerState::MetadataReceived {
                    resource,
                    data,
                    created_at: parse_created_at(headers),
                    received_at: Utc::now(),
                };
                Ok(())
            }
            state @ AssemblerState::MetadataReceived { .. } => {
                // Restore before failing so the in-progress build survives.
                self.state = state;
                Err(WebPushError::Protocol(
                    "duplicate response metadata for the announced message".into(),
                ))
            }
        }
    }

    /// Append a data frame; the final frame yields the assembled message
    /// and resets the assembler for the next delivery on the same stream.
    pub fn on_data(
        &mut self,
        chunk: &[u8],
        end_of_stream: bool,
    ) -> Result<Option<PushMessage>, WebPushError> {
        match &mut self.state {
            AssemblerState::Idle => Err(WebPushError::Protocol(
                "data frame arrived with no announced message".into(),
            )),
            AssemblerState::Announced { data, .. }
            | AssemblerState::MetadataReceived { data, .. } => {
                data.push_str(&String::from_utf8_lossy(chunk));
                if !end_of_stream {
                    return Ok(None);
                }
                match std::mem::replace(&mut self.state, AssemblerState::Idle) {
                    AssemblerState::Announced { resource, data } => {
                        PushMessage::new(resource, data, None, Utc::now()).map(Some)
                    }
                    AssemblerState::MetadataReceived {
                        resource,
                        data,
                        created_at,
                        received_at,
                    } => PushMessage::new(resource, data, created_at, received_at).map(Some),
                    AssemblerState::Idle => unreachable!("state checked above"),
                }
            }
        }
    }
}

fn parse_created_at(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(DATE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
