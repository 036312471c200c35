//! HTTP adapter for Stripe webhook delivery.
//!
//! Exposes the reconciliation engine via:
//! - `POST /webhooks/stripe` - Verify and reconcile a Stripe event
//! - `GET /health` - Liveness check

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::ErrorResponse;
pub use handlers::WebhookAppState;
pub use routes::webhook_router;
