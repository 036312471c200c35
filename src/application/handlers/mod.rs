//! Application handlers.
//!
//! Command and event handlers that orchestrate domain operations.

pub mod billing;
