//! HTTP DTOs for the webhook endpoints.
//!
//! Successful and failed reconciliations both answer with the
//! `PaymentConfirmation` JSON; only rejected deliveries use `ErrorResponse`.

use serde::{Deserialize, Serialize};

/// Body returned when a delivery is rejected before reaching a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
