//! Domain layer containing reconciliation rules and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `billing` - Payment transactions, gateway events, and the token award policy

pub mod billing;
pub mod foundation;
