//! Payment gateway port for read-only lookups against the processor.
//!
//! Webhook payloads do not always carry everything reconciliation needs:
//! renewal invoices may omit the price, and a checkout session may have
//! lost its metadata. Handlers use this port to fetch the authoritative
//! object from the gateway in those cases.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{GatewayCheckoutSession, GatewaySubscription};
use crate::domain::foundation::{DomainError, ErrorCode};

/// Port for payment gateway lookups.
///
/// `Ok(None)` means the gateway answered and the object does not exist.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway identifier stored on payment transactions (e.g. "stripe").
    fn gateway_id(&self) -> &str;

    /// Retrieve a subscription with its item prices.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, PaymentGatewayError>;

    /// Retrieve a checkout session with its metadata.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GatewayCheckoutSession>, PaymentGatewayError>;
}

/// Payment gateway error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentGatewayError {
    /// Error code for categorization.
    pub code: PaymentGatewayErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentGatewayError {
    pub fn new(code: PaymentGatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentGatewayErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentGatewayErrorCode::AuthenticationError, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentGatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentGatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentGatewayError {}

impl From<PaymentGatewayError> for DomainError {
    fn from(err: PaymentGatewayError) -> Self {
        DomainError::new(ErrorCode::ExternalServiceError, err.message)
    }
}

/// Payment gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentGatewayErrorCode {
    /// Network connectivity issue or timeout.
    NetworkError,

    /// API key rejected.
    AuthenticationError,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Response could not be decoded.
    InvalidResponse,

    /// Provider returned an error.
    ProviderError,
}

impl PaymentGatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentGatewayErrorCode::NetworkError
                | PaymentGatewayErrorCode::RateLimitExceeded
                | PaymentGatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentGatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentGatewayErrorCode::NetworkError => "network_error",
            PaymentGatewayErrorCode::AuthenticationError => "authentication_error",
            PaymentGatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentGatewayErrorCode::InvalidResponse => "invalid_response",
            PaymentGatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(PaymentGatewayError::network("timeout").retryable);
    }

    #[test]
    fn authentication_errors_are_not_retryable() {
        assert!(!PaymentGatewayError::authentication("bad key").retryable);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = PaymentGatewayError::provider("boom").with_provider_code("api_error");
        assert_eq!(err.to_string(), "provider_error: boom");
        assert_eq!(err.provider_code.as_deref(), Some("api_error"));
    }

    #[test]
    fn converts_to_external_service_domain_error() {
        let err: DomainError = PaymentGatewayError::network("down").into();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
    }
}
