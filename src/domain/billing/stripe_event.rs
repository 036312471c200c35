//! Stripe webhook event envelope.
//!
//! The `data.object` payload stays untyped until the handler for the
//! event type asks for its concrete shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One webhook delivery as Stripe sends it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// `evt_...`; doubles as the ledger idempotency key for checkout credits.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn is_live(&self) -> bool {
        self.livemode
    }

    /// Decodes `data.object` into the shape the handler expects.
    pub fn deserialize_object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data.object)
    }

    pub fn parsed_type(&self) -> StripeEventType {
        StripeEventType::from_str(&self.event_type)
    }
}

/// Event types with a registered billing handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    CheckoutSessionAsyncPaymentFailed,
    CheckoutSessionExpired,
    PaymentIntentPaymentFailed,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    /// Acknowledged without processing.
    Unknown,
}

impl StripeEventType {
    const ROUTED: [(&'static str, StripeEventType); 8] = [
        ("checkout.session.completed", Self::CheckoutSessionCompleted),
        (
            "checkout.session.async_payment_failed",
            Self::CheckoutSessionAsyncPaymentFailed,
        ),
        ("checkout.session.expired", Self::CheckoutSessionExpired),
        ("payment_intent.payment_failed", Self::PaymentIntentPaymentFailed),
        ("invoice.payment_succeeded", Self::InvoicePaymentSucceeded),
        ("invoice.payment_failed", Self::InvoicePaymentFailed),
        ("customer.subscription.updated", Self::CustomerSubscriptionUpdated),
        ("customer.subscription.deleted", Self::CustomerSubscriptionDeleted),
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self::ROUTED
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, event_type)| *event_type)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        Self::ROUTED
            .iter()
            .find(|(_, event_type)| event_type == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for StripeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test helper for building events without a signed payload.
#[cfg(test)]
pub struct StripeEventBuilder {
    event: StripeEvent,
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self {
            event: StripeEvent {
                id: "evt_test_123".to_string(),
                event_type: StripeEventType::CheckoutSessionCompleted.as_str().to_string(),
                created: chrono::Utc::now().timestamp(),
                data: StripeEventData {
                    object: serde_json::json!({}),
                },
                livemode: false,
                api_version: Some("2023-10-16".to_string()),
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: Value) -> Self {
        self.event.data.object = object;
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.event.livemode = livemode;
        self
    }

    pub fn build(self) -> StripeEvent {
        self.event
    }
}
