//! Axum router configuration for webhook endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{handle_stripe_webhook, health, WebhookAppState};

/// Create the webhook router.
///
/// # Routes
/// - `POST /webhooks/stripe` - Handle Stripe webhooks (signature verified, no auth)
/// - `GET /health` - Liveness check
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new()
        .route("/webhooks/stripe", post(handle_stripe_webhook))
        .route("/health", get(health))
}
