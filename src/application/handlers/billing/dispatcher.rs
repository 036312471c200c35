//! Routes verified gateway events to the billing handler for their type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::domain::billing::{PaymentConfirmation, StripeEvent, StripeEventType};

/// Handler for one or more Stripe event types.
///
/// Handlers never return `Err`: every outcome, including failures, is a
/// `PaymentConfirmation` so callers have one shape to log and retry on.
#[async_trait]
pub trait BillingEventHandler: Send + Sync {
    /// Returns the event type(s) this handler processes.
    fn handles(&self) -> Vec<StripeEventType>;

    async fn handle(&self, event: &StripeEvent) -> PaymentConfirmation;
}

/// Event type to handler routing table.
#[derive(Default)]
pub struct WebhookDispatcher {
    handlers: HashMap<StripeEventType, Arc<dyn BillingEventHandler>>,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for every type it reports; later registrations win.
    pub fn register(mut self, handler: Arc<dyn BillingEventHandler>) -> Self {
        for event_type in handler.handles() {
            self.handlers.insert(event_type, handler.clone());
        }
        self
    }

    pub fn get_handler(&self, event_type: &StripeEventType) -> Option<&Arc<dyn BillingEventHandler>> {
        self.handlers.get(event_type)
    }

    /// Dispatches an event. Types without a handler are acknowledged.
    pub async fn dispatch(&self, event: &StripeEvent) -> PaymentConfirmation {
        let span = tracing::info_span!(
            "billing_event",
            event_id = %event.id,
            event_type = %event.event_type
        );
        self.route(event).instrument(span).await
    }

    async fn route(&self, event: &StripeEvent) -> PaymentConfirmation {
        let Some(handler) = self.get_handler(&event.parsed_type()) else {
            tracing::debug!("No handler registered; acknowledging");
            return PaymentConfirmation::acknowledged(
                &event.id,
                format!(
                    "Webhook event type {} received but not processed.",
                    event.event_type
                ),
            );
        };

        let confirmation = handler.handle(event).await;
        if confirmation.success {
            tracing::info!(
                transaction_id = %confirmation.transaction_id,
                tokens_awarded = ?confirmation.tokens_awarded,
                "Billing event reconciled"
            );
        } else {
            tracing::error!(
                transaction_id = %confirmation.transaction_id,
                error = ?confirmation.error,
                retryable = confirmation.error_code.is_some_and(|code| code.is_retryable()),
                "Billing event failed"
            );
        }
        confirmation
    }
}
