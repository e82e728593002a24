//! Subscription value type

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::errors::WebPushError;

/// Validated parameter record used to construct a [`Subscription`].
///
/// The three resource fields are required; construction fails with
/// [`WebPushError::Validation`] when any of them is absent.
#[derive(Debug, Default)]
pub struct SubscriptionParams {
    pub subscription_resource: Option<String>,
    pub push_resource: Option<String>,
    pub receipt_subscribe_resource: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<u64>,
}

/// A push subscription created on the WebPush server.
///
/// The subscription resource is the durable identity: equality and hashing
/// are defined solely by it. Instances are immutable and are only produced
/// by a successful subscribe exchange.
#[derive(Debug, Clone)]
pub struct Subscription {
    subscription_resource: String,
    push_resource: String,
    receipt_subscribe_resource: String,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<u64>,
}

impl Subscription {
    /// Build a subscription from a validated parameter record.
    pub fn new(params: SubscriptionParams) -> Result<Self, WebPushError> {
        let subscription_resource = params
            .subscription_resource
            .ok_or_else(|| WebPushError::Validation("subscription resource is missing".into()))?;
        let push_resource = params
            .push_resource
            .ok_or_else(|| WebPushError::Validation("push resource is missing".into()))?;
        let receipt_subscribe_resource = params.receipt_subscribe_resource.ok_or_else(|| {
            WebPushError::Validation("receipt subscribe resource is missing".into())
        })?;

        Ok(Self {
            subscription_resource,
            push_resource,
            receipt_subscribe_resource,
            created_at: params.created_at,
            expires_at: params.expires_at,
        })
    }

    /// Private management URI for this subscription. It is used to monitor
    /// the subscription and to delete it, and must not be shared with
    /// application servers.
    pub fn subscription_resource(&self) -> &str {
        &self.subscription_resource
    }

    /// Public URI an application server uses to send messages to this
    /// subscription (link relation `urn:ietf:params:push`).
    pub fn push_resource(&self) -> &str {
        &self.push_resource
    }

    /// URI an application server uses to create a receipt subscription
    /// (link relation `urn:ietf:params:push:receipt`).
    pub fn receipt_subscribe_resource(&self) -> &str {
        &self.receipt_subscribe_resource
    }

    /// Server-reported creation time, when the response carried one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Subscription lifetime in seconds. Absent means non-expiring.
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.subscription_resource == other.subscription_resource
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subscription_resource.hash(state);
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({})", self.subscription_resource)
    }
}
