//! # WebPush client
//!
//! A client implementation of the WebPush protocol over a multiplexed
//! HTTP/2 transport. One long-lived connection carries the subscribe and
//! delete exchange plus any number of concurrent message-monitoring
//! streams, and every outcome is delivered through per-subscription
//! callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webpush::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WebPushError> {
//!     let transport = Arc::new(H2Transport::new(H2Config::default()).await?);
//!     let engine = SessionEngine::new(transport, SessionConfig::default());
//!
//!     let monitor_engine = engine.clone();
//!     let callback: SubscriptionCallback = Arc::new(move |result| {
//!         let engine = monitor_engine.clone();
//!         Box::pin(async move {
//!             let subscription = result?;
//!             let on_message: MessageCallback = Arc::new(|result| {
//!                 Box::pin(async move {
//!                     if let Some(message) = result? {
//!                         println!("{}: {}", message.resource(), message.data());
//!                     }
//!                     Ok(())
//!                 })
//!             });
//!             engine
//!                 .monitor(subscription, MonitorMode::Blocking, on_message)
//!                 .await;
//!             Ok(())
//!         })
//!     });
//!     engine.subscribe(callback);
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     engine.disconnect().await
//! }
//! ```

pub mod prelude;

pub use webpush_core::{
    parse_link, parse_max_age, MessageCallback, MonitorMode, PushMessage, PushMessageAssembler,
    RequestStream, SessionConfig, SessionEngine, StreamCancel, StreamEvent, Subscription,
    SubscriptionCallback, SubscriptionParams, SubscriptionRegistry, Transport, WebPushError,
};

pub use webpush_h2::{H2Config, H2Transport};
