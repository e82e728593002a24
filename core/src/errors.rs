//! Error types for the WebPush client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebPushError {
    /// An entity could not be constructed from incomplete or empty data,
    /// e.g. an empty push message payload or a subscription response that
    /// is missing a required resource header.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport events arrived out of the expected state-machine order,
    /// or protocol metadata was missing at a point where the protocol
    /// guarantees its presence.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Connection, I/O, or stream-level failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Callback execution error: {0}")]
    Callback(String),
}
