//! Stripe gateway adapter.
//!
//! Implements the `PaymentGateway` port against the Stripe REST API.
//! Only the read-only lookups reconciliation needs are covered:
//! - Subscriptions (`GET /v1/subscriptions/{id}`)
//! - Checkout sessions (`GET /v1/checkout/sessions/{id}`)
//!
//! # Security
//!
//! The API key is held in a `secrecy::SecretString` and only exposed to
//! build the basic-auth header.

mod stripe_gateway;

pub use stripe_gateway::{StripeGateway, StripeGatewayConfig};
