//! Transport trait for pluggable WebPush transports

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, Method, StatusCode};
use tokio::sync::{mpsc, oneshot};

use crate::errors::WebPushError;

/// Typed frame event delivered on an open request stream.
///
/// Each stream yields a strictly ordered sequence of these events. For a
/// monitoring request, one push message arrives as
/// `Announcement` → `Metadata` → `Data`* with the final data frame
/// carrying `end_of_stream`.
#[derive(Debug)]
pub enum StreamEvent {
    /// A push announcement: a new message is being delivered on this
    /// stream, identified by its resource path.
    Announcement { resource: String },
    /// Response metadata for the stream itself or for the announced
    /// message.
    Metadata {
        status: StatusCode,
        headers: HeaderMap,
    },
    /// A chunk of message payload. `end_of_stream` finalizes the message.
    Data { chunk: Bytes, end_of_stream: bool },
}

/// Cancellation handle for a live request stream.
///
/// Cancelling (or dropping) the handle signals the transport to abort the
/// underlying network stream; a discarded callback never leaves a request
/// silently running.
#[derive(Debug)]
pub struct StreamCancel {
    tx: Option<oneshot::Sender<()>>,
}

impl StreamCancel {
    /// Create a cancel handle and the receiver a transport implementation
    /// observes for cancellation.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Abort the underlying request stream.
    pub fn cancel(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for StreamCancel {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// An open request stream: the event sequence plus its cancel handle.
pub struct RequestStream {
    pub events: mpsc::Receiver<Result<StreamEvent, WebPushError>>,
    pub cancel: StreamCancel,
}

/// Generic transport trait the session engine drives.
///
/// The transport owns connection establishment, secure-channel
/// negotiation, frame encoding, and stream multiplexing; the engine only
/// opens request streams and consumes their typed events.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a long-lived request stream and deliver its events in order.
    async fn open_stream(
        &self,
        method: Method,
        path: &str,
        headers: Vec<(HeaderName, String)>,
    ) -> Result<RequestStream, WebPushError>;

    /// Send a fire-and-forget request (subscription delete, message
    /// acknowledge) and wait for its completion.
    async fn send(&self, method: Method, path: &str) -> Result<(), WebPushError>;

    /// Whether the underlying connection is established.
    async fn is_connected(&self) -> bool;

    /// Tear down the underlying connection.
    async fn disconnect(&self) -> Result<(), WebPushError>;
}
