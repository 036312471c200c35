//! Ordered chain of token-count resolvers for renewal invoices.
//!
//! Each source looks at the invoice in its own way and either answers with a
//! count or passes. The first answer wins. When every source passes the
//! payment is still recorded, with zero tokens.

use async_trait::async_trait;

use super::{
    GatewaySubscription, InvoiceObject, ReconcileError, ResolvedPlan, TOKENS_TO_AWARD_KEY,
};

/// Token count decided for an invoice, and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAward {
    pub tokens: i64,
    pub source: &'static str,
    /// Present when the count came from the plan catalog.
    pub plan: Option<ResolvedPlan>,
    /// Present when a gateway round-trip was needed to find the plan.
    pub subscription: Option<GatewaySubscription>,
}

impl TokenAward {
    /// Fallback when no source yields a count.
    pub fn none() -> Self {
        Self {
            tokens: 0,
            source: "none",
            plan: None,
            subscription: None,
        }
    }

    pub fn from_metadata(tokens: i64, source: &'static str) -> Self {
        Self {
            tokens,
            source,
            plan: None,
            subscription: None,
        }
    }
}

/// One link in the resolver chain.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short name recorded in transaction metadata.
    fn name(&self) -> &'static str;

    /// `Ok(None)` passes to the next source; `Err` stops the chain.
    async fn resolve(&self, invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError>;
}

/// Runs token sources in order until one answers.
pub struct TokenSourceChain {
    sources: Vec<Box<dyn TokenSource>>,
}

impl TokenSourceChain {
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    pub async fn resolve(&self, invoice: &InvoiceObject) -> Result<TokenAward, ReconcileError> {
        for source in &self.sources {
            if let Some(award) = source.resolve(invoice).await? {
                tracing::debug!(
                    invoice_id = %invoice.id,
                    source = source.name(),
                    tokens = award.tokens,
                    "Token count resolved"
                );
                return Ok(award);
            }
        }

        tracing::warn!(
            invoice_id = %invoice.id,
            "No token source yielded a count; recording payment with zero tokens"
        );
        Ok(TokenAward::none())
    }
}

/// Parses a metadata token count; anything that is not a non-negative integer passes.
fn parse_token_count(raw: Option<&String>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|tokens| *tokens >= 0)
}

/// Explicit `tokens_to_award` on the invoice metadata.
pub struct InvoiceMetadataSource;

#[async_trait]
impl TokenSource for InvoiceMetadataSource {
    fn name(&self) -> &'static str {
        "invoice_metadata"
    }

    async fn resolve(&self, invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError> {
        Ok(parse_token_count(invoice.metadata.get(TOKENS_TO_AWARD_KEY))
            .map(|tokens| TokenAward::from_metadata(tokens, self.name())))
    }
}

/// Explicit `tokens_to_award` on the first line item's metadata.
pub struct LineItemMetadataSource;

#[async_trait]
impl TokenSource for LineItemMetadataSource {
    fn name(&self) -> &'static str {
        "line_item_metadata"
    }

    async fn resolve(&self, invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError> {
        Ok(invoice
            .first_line()
            .and_then(|line| parse_token_count(line.metadata.get(TOKENS_TO_AWARD_KEY)))
            .map(|tokens| TokenAward::from_metadata(tokens, self.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn invoice(invoice_meta: serde_json::Value, line_meta: serde_json::Value) -> InvoiceObject {
        serde_json::from_value(json!({
            "id": "in_1",
            "customer": "cus_1",
            "metadata": invoice_meta,
            "lines": { "data": [ { "id": "il_1", "metadata": line_meta } ] }
        }))
        .unwrap()
    }

    /// Source that always answers with a fixed count and counts its calls.
    struct FixedSource {
        tokens: Option<i64>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TokenSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn resolve(&self, _invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens.map(|t| TokenAward::from_metadata(t, "fixed")))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TokenSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn resolve(&self, _invoice: &InvoiceObject) -> Result<Option<TokenAward>, ReconcileError> {
            Err(ReconcileError::PlanNotFound {
                price_id: "price_missing".into(),
            })
        }
    }

    #[tokio::test]
    async fn invoice_metadata_wins_over_line_item() {
        let chain = TokenSourceChain::new(vec![
            Box::new(InvoiceMetadataSource),
            Box::new(LineItemMetadataSource),
        ]);

        let award = chain
            .resolve(&invoice(json!({"tokens_to_award": "300"}), json!({"tokens_to_award": "50"})))
            .await
            .unwrap();

        assert_eq!(award.tokens, 300);
        assert_eq!(award.source, "invoice_metadata");
    }

    #[tokio::test]
    async fn line_item_metadata_used_when_invoice_has_none() {
        let chain = TokenSourceChain::new(vec![
            Box::new(InvoiceMetadataSource),
            Box::new(LineItemMetadataSource),
        ]);

        let award = chain
            .resolve(&invoice(json!({}), json!({"tokens_to_award": "50"})))
            .await
            .unwrap();

        assert_eq!(award.tokens, 50);
        assert_eq!(award.source, "line_item_metadata");
    }

    #[tokio::test]
    async fn unparsable_metadata_passes_to_next_source() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TokenSourceChain::new(vec![
            Box::new(InvoiceMetadataSource),
            Box::new(FixedSource { tokens: Some(7), calls: calls.clone() }),
        ]);

        let award = chain
            .resolve(&invoice(json!({"tokens_to_award": "lots"}), json!({})))
            .await
            .unwrap();

        assert_eq!(award.tokens, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn later_sources_are_not_consulted_after_a_hit() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TokenSourceChain::new(vec![
            Box::new(InvoiceMetadataSource),
            Box::new(FixedSource { tokens: Some(1), calls: calls.clone() }),
        ]);

        chain
            .resolve(&invoice(json!({"tokens_to_award": "10"}), json!({})))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_falls_back_to_zero_tokens() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TokenSourceChain::new(vec![
            Box::new(InvoiceMetadataSource),
            Box::new(FixedSource { tokens: None, calls }),
        ]);

        let award = chain.resolve(&invoice(json!({}), json!({}))).await.unwrap();

        assert_eq!(award, TokenAward::none());
    }

    #[tokio::test]
    async fn resolver_error_stops_the_chain() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = TokenSourceChain::new(vec![
            Box::new(FailingSource),
            Box::new(FixedSource { tokens: Some(1), calls: calls.clone() }),
        ]);

        let result = chain.resolve(&invoice(json!({}), json!({}))).await;

        assert!(matches!(result, Err(ReconcileError::PlanNotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    proptest! {
        #[test]
        fn parse_token_count_accepts_only_non_negative_integers(n in any::<i64>()) {
            let parsed = parse_token_count(Some(&n.to_string()));
            if n >= 0 {
                prop_assert_eq!(parsed, Some(n));
            } else {
                prop_assert_eq!(parsed, None);
            }
        }
    }
}
