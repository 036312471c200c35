//! Adapters - Implementations of port interfaces.
//!
//! - `http` - axum webhook endpoint
//! - `memory` - in-memory ports for tests and local runs
//! - `postgres` - sqlx persistence and the token ledger procedure
//! - `stripe` - Stripe REST lookups

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
