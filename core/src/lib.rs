//! Core types and session engine for the WebPush client
//!
//! This crate contains the protocol session engine: the link header
//! parsing that extracts resource URIs from a subscribe response, the
//! per-stream state machine that assembles push messages from transport
//! frame events, the registry that enforces a single monitor per
//! subscription, and the engine that orchestrates them against a
//! pluggable [`Transport`].

pub mod assembler;
pub mod config;
pub mod engine;
pub mod errors;
pub mod link;
pub mod message;
pub mod prelude;
pub mod registry;
pub mod subscription;
pub mod transport;

pub use assembler::PushMessageAssembler;
pub use config::SessionConfig;
pub use engine::{MessageCallback, MonitorMode, SessionEngine, SubscriptionCallback};
pub use errors::WebPushError;
pub use link::{parse_link, parse_max_age};
pub use message::PushMessage;
pub use registry::{MonitorRegistration, SubscriptionRegistry};
pub use subscription::{Subscription, SubscriptionParams};
pub use transport::{RequestStream, StreamCancel, StreamEvent, Transport};
