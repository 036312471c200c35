//! Token Reconciler - Stripe payment events to a prepaid token ledger
//!
//! Consumes at-least-once Stripe webhook deliveries and turns them into
//! durable payment transactions, crediting each successful payment to the
//! user's token wallet exactly once.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
