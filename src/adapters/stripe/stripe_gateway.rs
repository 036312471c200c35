//! Stripe implementation of the `PaymentGateway` port.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeGatewayConfig::new(api_key).with_base_url("http://localhost:12111");
//! let gateway = StripeGateway::new(config);
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::domain::billing::{
    CheckoutSessionObject, GatewayCheckoutSession, GatewaySubscription, SubscriptionObject,
};
use crate::ports::{PaymentGateway, PaymentGatewayError, PaymentGatewayErrorCode};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeGatewayConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Identifier stored in `payment_transactions.payment_gateway_id`.
    gateway_id: String,

    request_timeout: Duration,
}

impl StripeGatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            gateway_id: "stripe".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_gateway_id(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = gateway_id.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGatewayConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("gateway_id", &self.gateway_id)
            .finish()
    }
}

/// Stripe gateway adapter.
pub struct StripeGateway {
    config: StripeGatewayConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeGatewayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// GETs a Stripe object; 404 is `None`.
    async fn get_object<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PaymentGatewayError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentGatewayError::network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(path = %path, status = %status, "Stripe API error");
            return Err(error_for_status(status, &error_text));
        }

        response.json().await.map(Some).map_err(|e| {
            PaymentGatewayError::new(
                PaymentGatewayErrorCode::InvalidResponse,
                format!("Failed to parse Stripe response: {}", e),
            )
        })
    }
}

fn error_for_status(status: StatusCode, body: &str) -> PaymentGatewayError {
    let message = format!("Stripe API error: {}", body);
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentGatewayError::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => {
            PaymentGatewayError::new(PaymentGatewayErrorCode::RateLimitExceeded, message)
        }
        _ => PaymentGatewayError::provider(message),
    };
    err.with_provider_code(status.as_u16().to_string())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn gateway_id(&self) -> &str {
        &self.config.gateway_id
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, PaymentGatewayError> {
        let subscription: Option<SubscriptionObject> = self
            .get_object(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(subscription.map(GatewaySubscription::from))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GatewayCheckoutSession>, PaymentGatewayError> {
        let session: Option<CheckoutSessionObject> = self
            .get_object(&format!("/v1/checkout/sessions/{}", session_id))
            .await?;
        Ok(session.map(|session| GatewayCheckoutSession {
            id: session.id,
            metadata: session.metadata,
        }))
    }
}
