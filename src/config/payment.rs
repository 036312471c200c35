//! Payment gateway configuration (Stripe).

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key used for subscription and session lookups
    pub stripe_api_key: SecretString,

    /// Webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: SecretString,

    #[serde(default = "default_api_base_url")]
    pub stripe_api_base_url: String,

    /// Reject test-mode events
    #[serde(default)]
    pub require_livemode: bool,

    /// Gateway name stored on every payment transaction
    #[serde(default = "default_gateway_id")]
    pub payment_gateway_id: String,

    /// Maximum age of a signed delivery, in seconds
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,
}

impl PaymentConfig {
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    /// Validate payment configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        // Restricted keys (rk_) can be scoped to read-only lookups.
        if !api_key.starts_with("sk_") && !api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if production && !self.stripe_api_base_url.starts_with("https://") {
            return Err(ValidationError::StripeBaseUrlMustBeHttps);
        }
        if self.signature_tolerance_secs <= 0 {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        if self.payment_gateway_id.trim().is_empty() {
            return Err(ValidationError::EmptyGatewayId);
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_gateway_id() -> String {
    "stripe".to_string()
}

fn default_signature_tolerance() -> i64 {
    300
}
