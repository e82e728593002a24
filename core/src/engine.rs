//! Session engine orchestrating subscribe, monitor, and acknowledge flows

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::header::{CACHE_CONTROL, DATE, LINK, LOCATION};
use http::{HeaderMap, HeaderName, Method, StatusCode};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::assembler::PushMessageAssembler;
use crate::config::{SessionConfig, PREFER_HEADER, PREFER_NON_BLOCKING, PUSH_REL, RECEIPT_REL};
use crate::errors::WebPushError;
use crate::link::{parse_link, parse_max_age};
use crate::message::PushMessage;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{Subscription, SubscriptionParams};
use crate::transport::{StreamEvent, Transport};

/// Callback invoked with the outcome of a subscribe exchange.
pub type SubscriptionCallback = Arc<
    dyn Fn(
            Result<Subscription, WebPushError>,
        ) -> Pin<Box<dyn Future<Output = Result<(), WebPushError>> + Send>>
        + Send
        + Sync,
>;

/// Callback invoked for each monitoring outcome: `Ok(Some(message))` for a
/// delivered push message, `Ok(None)` for a non-blocking "no content"
/// poll, `Err` for a protocol or transport failure on the stream.
pub type MessageCallback = Arc<
    dyn Fn(
            Result<Option<PushMessage>, WebPushError>,
        ) -> Pin<Box<dyn Future<Output = Result<(), WebPushError>> + Send>>
        + Send
        + Sync,
>;

/// Monitoring wait mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Long-poll: wait for the next message.
    Blocking,
    /// Poll "now": the server answers "no content" immediately when no
    /// message is pending.
    NonBlocking,
}

/// WebPush protocol session engine.
///
/// Drives a [`Transport`] to create and delete subscriptions and to
/// monitor them for push messages. One engine multiplexes many concurrent
/// logical conversations over the transport's single connection; no
/// operation blocks the caller, and completion is always signaled through
/// the caller-supplied callback.
pub struct SessionEngine<T: Transport> {
    transport: Arc<T>,
    registry: SubscriptionRegistry,
    config: Arc<SessionConfig>,
}

impl<T: Transport> Clone for SessionEngine<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: self.registry.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Transport + 'static> SessionEngine<T> {
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Self {
        Self {
            transport,
            registry: SubscriptionRegistry::new(),
            config: Arc::new(config),
        }
    }

    /// Create a new subscription on the server.
    ///
    /// The callback is invoked exactly once: with the constructed
    /// [`Subscription`] on success, or with the validation, protocol, or
    /// transport error that ended the exchange.
    pub fn subscribe(&self, callback: SubscriptionCallback) {
        let transport = Arc::clone(&self.transport);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            let result = run_subscribe(transport, &config).await;
            if let Err(e) = callback(result).await {
                error!(error = %e, "subscribe callback failed");
            }
        });
    }

    /// Start monitoring a subscription for push messages.
    ///
    /// At most one monitor exists per subscription: a duplicate call is a
    /// silent no-op and the callback registered first keeps receiving all
    /// deliveries. Each finalized message is acknowledged on the server
    /// before the callback sees it. Returns whether this call registered
    /// the monitor.
    pub async fn monitor(
        &self,
        subscription: Subscription,
        mode: MonitorMode,
        callback: MessageCallback,
    ) -> bool {
        // The consumer task is spawned parked and only released once the
        // registration has won the registry race, so a losing duplicate
        // call never touches the transport. The registration id travels
        // with the release so the task can clean up exactly its own entry.
        let (go_tx, go_rx) = oneshot::channel::<Option<u64>>();
        let transport = Arc::clone(&self.transport);
        let registry = self.registry.clone();
        let task_subscription = subscription.clone();
        let task_callback = Arc::clone(&callback);
        let task = tokio::spawn(async move {
            let Ok(Some(registration_id)) = go_rx.await else {
                return;
            };
            run_monitor(
                transport,
                registry,
                task_subscription,
                mode,
                task_callback,
                registration_id,
            )
            .await;
        });

        let registration_id = self
            .registry
            .register(subscription.clone(), callback, task.abort_handle())
            .await;
        let registered = registration_id.is_some();
        let _ = go_tx.send(registration_id);

        if registered {
            info!(subscription = %subscription, mode = ?mode, "monitoring started");
        } else {
            debug!(subscription = %subscription, "monitor request ignored, already monitored");
        }
        registered
    }

    /// Stop monitoring a subscription.
    ///
    /// Aborts the consumer task, which closes the live transport stream.
    /// Returns `false` when the subscription was not monitored; calling
    /// this twice has the same observable effect as calling it once.
    pub async fn cancel_monitoring(&self, subscription: &Subscription) -> bool {
        match self.registry.cancel(subscription).await {
            Some(registration) => {
                registration.abort();
                info!(subscription = %subscription, "monitoring cancelled");
                true
            }
            None => {
                debug!(subscription = %subscription, "cancel ignored, not monitored");
                false
            }
        }
    }

    /// Delete a subscription on the server.
    ///
    /// Any active monitor is cancelled first; the delete request is issued
    /// regardless of whether one was active.
    pub async fn delete_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), WebPushError> {
        self.cancel_monitoring(subscription).await;
        self.transport
            .send(Method::DELETE, subscription.subscription_resource())
            .await?;
        info!(subscription = %subscription, "subscription deleted");
        Ok(())
    }

    /// Number of currently monitored subscriptions.
    pub async fn monitored_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Tear down the session: cancel every active monitor and disconnect
    /// the transport.
    pub async fn disconnect(&self) -> Result<(), WebPushError> {
        for registration in self.registry.drain().await {
            debug!(subscription = %registration.subscription(), "cancelling monitor on disconnect");
            registration.abort();
        }
        self.transport.disconnect().await
    }
}

async fn run_subscribe<T: Transport>(
    transport: Arc<T>,
    config: &SessionConfig,
) -> Result<Subscription, WebPushError> {
    let mut stream = transport
        .open_stream(Method::POST, &config.subscribe_path, Vec::new())
        .await?;

    while let Some(event) = stream.events.recv().await {
        match event? {
            StreamEvent::Metadata { status, headers } => {
                if !status.is_success() {
                    return Err(WebPushError::Protocol(format!(
                        "subscribe request answered with status {status}"
                    )));
                }
                return subscription_from_headers(&headers);
            }
            StreamEvent::Announcement { resource } => {
                return Err(WebPushError::Protocol(format!(
                    "unexpected push announcement {resource} on subscribe stream"
                )));
            }
            // The subscribe response carries everything in its headers.
            StreamEvent::Data { .. } => {}
        }
    }

    Err(WebPushError::Transport(
        "subscribe stream closed before response metadata".into(),
    ))
}

/// Build a [`Subscription`] from subscribe response metadata: the
/// location header names the subscription resource, the link relations
/// name the push and receipt subscribe resources, and the cache-control
/// max-age bounds the subscription lifetime.
fn subscription_from_headers(headers: &HeaderMap) -> Result<Subscription, WebPushError> {
    let links: Vec<&str> = headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    Subscription::new(SubscriptionParams {
        subscription_resource: headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        push_resource: parse_link(&links, PUSH_REL),
        receipt_subscribe_resource: parse_link(&links, RECEIPT_REL),
        created_at: headers
            .get(DATE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| chrono::DateTime::parse_from_rfc2822(value).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        expires_at: headers
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_max_age),
    })
}

async fn run_monitor<T: Transport>(
    transport: Arc<T>,
    registry: SubscriptionRegistry,
    subscription: Subscription,
    mode: MonitorMode,
    callback: MessageCallback,
    registration_id: u64,
) {
    let mut headers: Vec<(HeaderName, String)> = Vec::new();
    if mode == MonitorMode::NonBlocking {
        headers.push((
            HeaderName::from_static(PREFER_HEADER),
            PREFER_NON_BLOCKING.to_string(),
        ));
    }

    let mut stream = match transport
        .open_stream(
            Method::GET,
            subscription.subscription_resource(),
            headers,
        )
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            registry.cancel_if(&subscription, registration_id).await;
            deliver(&callback, Err(e)).await;
            return;
        }
    };

    // A terminal outcome ends the monitor. It is delivered only after the
    // registration has been removed, so a callback that reacts to it by
    // monitoring the subscription again registers cleanly instead of
    // hitting its own dying predecessor.
    let mut assembler = PushMessageAssembler::new();
    let terminal: Option<Result<Option<PushMessage>, WebPushError>> = loop {
        let Some(event) = stream.events.recv().await else {
            break None;
        };
        match event {
            Ok(StreamEvent::Metadata { status, .. }) if status == StatusCode::NO_CONTENT => {
                // "No content" ends the current poll; it is only a caller-
                // visible outcome for a non-blocking monitor.
                match mode {
                    MonitorMode::NonBlocking => break Some(Ok(None)),
                    MonitorMode::Blocking => {
                        debug!(subscription = %subscription, "no content on blocking monitor ignored");
                    }
                }
            }
            Ok(StreamEvent::Announcement { resource }) => {
                if let Err(e) = assembler.on_announcement(resource) {
                    break Some(Err(e));
                }
            }
            Ok(StreamEvent::Metadata { headers, .. }) => {
                if let Err(e) = assembler.on_metadata(&headers) {
                    break Some(Err(e));
                }
            }
            Ok(StreamEvent::Data {
                chunk,
                end_of_stream,
            }) => match assembler.on_data(&chunk, end_of_stream) {
                Ok(Some(message)) => {
                    // Acknowledge before the caller sees the message.
                    if let Err(e) = transport.send(Method::DELETE, message.resource()).await {
                        warn!(
                            subscription = %subscription,
                            message = %message,
                            error = %e,
                            "acknowledge request failed"
                        );
                        break Some(Err(e));
                    }
                    info!(subscription = %subscription, message = %message, "push message delivered");
                    deliver(&callback, Ok(Some(message))).await;
                }
                Ok(None) => {}
                Err(e) => break Some(Err(e)),
            },
            Err(e) => break Some(Err(e)),
        }
    };

    // The stream is done, either way: drop the registration so the
    // subscription can be monitored again. Guarded by id in case the
    // monitor was cancelled and replaced while an event was in flight.
    if registry.cancel_if(&subscription, registration_id).await {
        debug!(subscription = %subscription, "monitor stream ended, registration removed");
    }
    if let Some(outcome) = terminal {
        deliver(&callback, outcome).await;
    }
}

async fn deliver(callback: &MessageCallback, result: Result<Option<PushMessage>, WebPushError>) {
    if let Err(e) = callback(result).await {
        error!(error = %e, "monitor callback failed");
    }
}
