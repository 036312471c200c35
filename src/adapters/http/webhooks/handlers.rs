//! HTTP handlers for the webhook endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::dto::{ErrorResponse, HealthResponse};
use crate::application::handlers::billing::{ProcessWebhookCommand, ProcessWebhookHandler};
use crate::domain::billing::{PaymentConfirmation, WebhookError};

const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the webhook router.
#[derive(Clone)]
pub struct WebhookAppState {
    pub webhook_handler: Arc<ProcessWebhookHandler>,
}

impl WebhookAppState {
    pub fn new(webhook_handler: ProcessWebhookHandler) -> Self {
        Self {
            webhook_handler: Arc::new(webhook_handler),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe - Reconcile a Stripe webhook event
pub async fn handle_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let confirmation = state.webhook_handler.handle(cmd).await?;
    Ok(confirmation_response(confirmation))
}

/// GET /health - Liveness check
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Failures answer with a non-2xx status so the gateway redelivers.
fn confirmation_response(confirmation: PaymentConfirmation) -> (StatusCode, Json<PaymentConfirmation>) {
    let status = if confirmation.success {
        StatusCode::OK
    } else {
        confirmation
            .error_code
            .map(|code| code.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    };
    (status, Json(confirmation))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts rejected deliveries to HTTP responses.
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let error_code = match &self.0 {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) => "MALFORMED_EVENT",
            WebhookError::LivemodeRequired => "LIVEMODE_REQUIRED",
        };

        tracing::warn!(error = %self.0, "Webhook delivery rejected");
        let body = ErrorResponse::new(error_code, self.0.to_string());
        (self.0.status_code(), Json(body)).into_response()
    }
}
