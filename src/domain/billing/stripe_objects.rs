//! Typed views of the Stripe objects carried in reconciliation events.
//!
//! The same shapes are returned by the Stripe REST API, so the gateway
//! adapter deserializes its responses into them as well.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use super::GatewaySubscription;

/// Metadata key set at checkout-session creation time.
pub const INTERNAL_PAYMENT_ID_KEY: &str = "internal_payment_id";

/// Metadata key that may carry an explicit token count.
pub const TOKENS_TO_AWARD_KEY: &str = "tokens_to_award";

/// Stripe sends `null` for empty maps and lists in some API versions.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Checkout Session object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckoutSessionObject {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Payment mode (payment, setup, subscription).
    pub mode: String,

    pub customer: Option<String>,

    /// Subscription ID if checkout created a subscription.
    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    pub fn is_subscription(&self) -> bool {
        self.mode == "subscription"
    }

    /// Internal payment transaction id placed in metadata at session creation.
    pub fn internal_payment_id(&self) -> Option<&str> {
        self.metadata
            .get(INTERNAL_PAYMENT_ID_KEY)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

/// The part of a checkout session or payment intent a failure notice needs.
///
/// Both objects carry the metadata written when the session was opened.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PaymentAttemptObject {
    /// `cs_...` or `pi_...`.
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
}

impl PaymentAttemptObject {
    pub fn internal_payment_id(&self) -> Option<&str> {
        self.metadata
            .get(INTERNAL_PAYMENT_ID_KEY)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoice
// ════════════════════════════════════════════════════════════════════════════════

/// Reference to a Stripe price.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceRef {
    pub id: String,
}

/// Stripe Invoice object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InvoiceObject {
    /// Unique invoice identifier (in_...).
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub subscription: Option<String>,

    /// Amount paid in cents.
    #[serde(default)]
    pub amount_paid: i64,

    /// Amount due in cents.
    #[serde(default)]
    pub amount_due: i64,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub attempt_count: i64,

    #[serde(default)]
    pub billing_reason: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub lines: InvoiceLines,
}

/// Invoice lines container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InvoiceLines {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<InvoiceLineItem>,
}

/// Single invoice line item.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InvoiceLineItem {
    pub id: String,

    #[serde(default)]
    pub price: Option<PriceRef>,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
}

impl InvoiceObject {
    pub fn first_line(&self) -> Option<&InvoiceLineItem> {
        self.lines.data.first()
    }

    /// Price of the first line item.
    pub fn first_line_price_id(&self) -> Option<&str> {
        self.first_line()
            .and_then(|line| line.price.as_ref())
            .map(|price| price.id.as_str())
    }

    /// Subscription on the invoice itself, falling back to the first line item's.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or_else(|| self.first_line().and_then(|line| line.subscription.as_deref()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Subscription object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionObject {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    pub status: String,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub items: SubscriptionItems,
}

/// Subscription items container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionItems {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<SubscriptionItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: PriceRef,
}

impl From<SubscriptionObject> for GatewaySubscription {
    fn from(sub: SubscriptionObject) -> Self {
        Self {
            id: sub.id,
            customer: sub.customer,
            status: sub.status,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            price_ids: sub.items.data.into_iter().map(|item| item.price.id).collect(),
        }
    }
}
