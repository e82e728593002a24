//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types and traits from the
//! webpush-core crate.

pub use crate::config::SessionConfig;
pub use crate::engine::{MessageCallback, MonitorMode, SessionEngine, SubscriptionCallback};
pub use crate::errors::WebPushError;
pub use crate::message::PushMessage;
pub use crate::registry::SubscriptionRegistry;
pub use crate::subscription::{Subscription, SubscriptionParams};
pub use crate::transport::{RequestStream, StreamCancel, StreamEvent, Transport};
