//! Token Reconciler server binary.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use token_reconciler::adapters::http::{webhook_router, WebhookAppState};
use token_reconciler::adapters::postgres::{
    PostgresPaymentTransactionRepository, PostgresPlanCatalog, PostgresTokenLedger,
    PostgresUserSubscriptionRepository, PostgresWalletDirectory,
};
use token_reconciler::adapters::stripe::{StripeGateway, StripeGatewayConfig};
use token_reconciler::application::{BillingPorts, ProcessWebhookHandler};
use token_reconciler::config::AppConfig;
use token_reconciler::domain::billing::StripeWebhookVerifier;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_current_span(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server.log_level);
    config.validate()?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let payment = &config.payment;
    let gateway = StripeGateway::new(
        StripeGatewayConfig::new(payment.stripe_api_key.expose_secret().clone())
            .with_base_url(payment.stripe_api_base_url.clone())
            .with_gateway_id(payment.payment_gateway_id.clone()),
    );

    let ports = BillingPorts {
        transactions: Arc::new(PostgresPaymentTransactionRepository::new(pool.clone())),
        ledger: Arc::new(PostgresTokenLedger::new(pool.clone())),
        gateway: Arc::new(gateway),
        catalog: Arc::new(PostgresPlanCatalog::new(pool.clone())),
        subscriptions: Arc::new(PostgresUserSubscriptionRepository::new(pool.clone())),
        wallets: Arc::new(PostgresWalletDirectory::new(pool)),
    };

    let verifier = StripeWebhookVerifier::new(payment.stripe_webhook_secret.expose_secret().clone())
        .with_tolerance_secs(payment.signature_tolerance_secs);
    let webhook_handler = ProcessWebhookHandler::new(verifier, Arc::new(ports.dispatcher()))
        .require_livemode(payment.require_livemode);

    let app = webhook_router()
        .with_state(WebhookAppState::new(webhook_handler))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        gateway_id = %payment.payment_gateway_id,
        livemode_required = payment.require_livemode,
        live_api_key = payment.is_live_mode(),
        "Token reconciler listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
