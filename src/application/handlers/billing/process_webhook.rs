//! ProcessWebhookHandler - command handler for raw Stripe webhook deliveries.

use std::sync::Arc;

use super::WebhookDispatcher;
use crate::domain::billing::{PaymentConfirmation, StripeWebhookVerifier, WebhookError};

/// Command to process one webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// Verifies a delivery and hands the event to its billing handler.
///
/// `Err` means the delivery itself was rejected; every outcome of a
/// verified event, failures included, is a `PaymentConfirmation`.
pub struct ProcessWebhookHandler {
    verifier: StripeWebhookVerifier,
    dispatcher: Arc<WebhookDispatcher>,
    require_livemode: bool,
}

impl ProcessWebhookHandler {
    pub fn new(verifier: StripeWebhookVerifier, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            verifier,
            dispatcher,
            require_livemode: false,
        }
    }

    /// Rejects test-mode events when set.
    pub fn require_livemode(mut self, required: bool) -> Self {
        self.require_livemode = required;
        self
    }

    pub async fn handle(&self, cmd: ProcessWebhookCommand) -> Result<PaymentConfirmation, WebhookError> {
        // 1. Verify signature and parse
        let signature = cmd.signature.ok_or(WebhookError::MissingSignature)?;
        let event = self.verifier.verify_and_parse(&cmd.payload, &signature)?;

        // 2. Mode check
        if self.require_livemode && !event.is_live() {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(WebhookError::LivemodeRequired);
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Verified webhook event"
        );

        // 3. Route
        Ok(self.dispatcher.dispatch(&event).await)
    }
}
