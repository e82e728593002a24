//! Subscription registry: at most one active monitor per subscription

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::engine::MessageCallback;
use crate::subscription::Subscription;

/// Registration binding a monitored subscription to its callback and the
/// consumer task draining its transport stream. Owned exclusively by the
/// registry; handed out once on cancellation so the engine can abort the
/// live stream.
pub struct MonitorRegistration {
    id: u64,
    subscription: Subscription,
    callback: MessageCallback,
    abort: AbortHandle,
}

impl MonitorRegistration {
    /// Registry-assigned identity of this registration. A later
    /// registration for the same subscription gets a different id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Stop the consumer task; dropping its request stream aborts the
    /// underlying transport stream.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// Concurrent map from subscription identity to its active monitor.
///
/// The map is both the presence lock and the dispatch table: all
/// operations are atomic with respect to each other, and the map itself
/// is never exposed. Cloning the registry clones a handle to the same
/// shared state.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    monitors: Arc<RwLock<HashMap<String, MonitorRegistration>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration if none exists for this subscription.
    ///
    /// Returns the id of the new registration, or `None` without touching
    /// the map when the subscription is already monitored; the first
    /// registration wins.
    pub async fn register(
        &self,
        subscription: Subscription,
        callback: MessageCallback,
        abort: AbortHandle,
    ) -> Option<u64> {
        let mut monitors = self.monitors.write().await;
        match monitors.entry(subscription.subscription_resource().to_string()) {
            Entry::Occupied(_) => {
                debug!(subscription = %subscription, "already monitored, registration skipped");
                None
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                vacant.insert(MonitorRegistration {
                    id,
                    subscription,
                    callback,
                    abort,
                });
                Some(id)
            }
        }
    }

    /// Atomically remove and return the registration, if any.
    pub async fn cancel(&self, subscription: &Subscription) -> Option<MonitorRegistration> {
        let mut monitors = self.monitors.write().await;
        monitors.remove(subscription.subscription_resource())
    }

    /// Remove the registration only if it still carries `id`.
    ///
    /// A consumer task uses this to clean up after itself: if the
    /// subscription was cancelled and re-monitored in the meantime, the
    /// current registration belongs to someone else and stays.
    pub async fn cancel_if(&self, subscription: &Subscription, id: u64) -> bool {
        let mut monitors = self.monitors.write().await;
        match monitors.entry(subscription.subscription_resource().to_string()) {
            Entry::Occupied(occupied) if occupied.get().id == id => {
                occupied.remove();
                true
            }
            _ => false,
        }
    }

    /// Callback registered for this subscription, used to route events.
    pub async fn lookup(&self, subscription: &Subscription) -> Option<MessageCallback> {
        let monitors = self.monitors.read().await;
        monitors
            .get(subscription.subscription_resource())
            .map(|registration| Arc::clone(&registration.callback))
    }

    pub async fn is_monitored(&self, subscription: &Subscription) -> bool {
        let monitors = self.monitors.read().await;
        monitors.contains_key(subscription.subscription_resource())
    }

    pub async fn len(&self) -> usize {
        self.monitors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.monitors.read().await.is_empty()
    }

    /// Remove every registration, returning them for teardown.
    pub async fn drain(&self) -> Vec<MonitorRegistration> {
        let mut monitors = self.monitors.write().await;
        monitors.drain().map(|(_, registration)| registration).collect()
    }
}
