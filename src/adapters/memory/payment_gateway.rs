//! In-memory PaymentGateway serving canned gateway objects.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::domain::billing::{GatewayCheckoutSession, GatewaySubscription};
use crate::ports::{PaymentGateway, PaymentGatewayError};

pub struct InMemoryPaymentGateway {
    gateway_id: String,
    subscriptions: RwLock<HashMap<String, GatewaySubscription>>,
    sessions: RwLock<HashMap<String, GatewayCheckoutSession>>,
    lookups: AtomicU32,
    fail: AtomicBool,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("stripe")
    }
}

impl InMemoryPaymentGateway {
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            subscriptions: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            lookups: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub async fn add_subscription(&self, subscription: GatewaySubscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
    }

    pub async fn add_checkout_session(&self, session: GatewayCheckoutSession) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    /// Simulates the gateway being unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn begin_lookup(&self) -> Result<(), PaymentGatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::network("gateway unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, PaymentGatewayError> {
        self.begin_lookup()?;
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GatewayCheckoutSession>, PaymentGatewayError> {
        self.begin_lookup()?;
        Ok(self.sessions.read().await.get(session_id).cloned())
    }
}
