//! # Checkout Backend Trait
//!
//! The seam between the orchestrator and the ways a checkout session can
//! be obtained. Every strategy — primary endpoint, mirror endpoint,
//! direct provider, emergency probe — implements `CheckoutBackend`, and
//! the orchestrator walks an ordered list of them, applying one uniform
//! error classification instead of per-endpoint response sniffing.

use crate::cart::LineItem;
use crate::error::CheckoutResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The full checkout request a backend attempts to turn into a redirect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPayload {
    /// Line items from the cart snapshot
    #[serde(rename = "lineItems")]
    pub line_items: Vec<LineItem>,

    /// Where the provider sends the customer after payment
    #[serde(rename = "successUrl")]
    pub success_url: String,

    /// Where the provider sends the customer on cancel
    #[serde(rename = "cancelUrl")]
    pub cancel_url: String,

    /// Prefill hint for the provider's payment form
    #[serde(rename = "customerEmail", skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// Pass-through metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Where the browser goes next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget {
    /// Server-side session ID, when the path that produced this target
    /// registered one (the direct-provider path does not)
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Provider-hosted checkout URL
    #[serde(rename = "redirectUrl")]
    pub redirect_url: String,
}

/// One way of obtaining a checkout session.
///
/// `attempt` must classify its own failures: a retryable error lets the
/// orchestrator move on to the next backend, a terminal error aborts the
/// whole chain.
#[async_trait::async_trait]
pub trait CheckoutBackend: Send + Sync {
    /// Try to produce a redirect target for this payload.
    async fn attempt(&self, payload: &CheckoutPayload) -> CheckoutResult<RedirectTarget>;

    /// Backend name for tracing spans and exhaustion reporting.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::ProductType;

    #[test]
    fn test_payload_serializes_camel_case() {
        let payload = CheckoutPayload {
            line_items: vec![LineItem {
                product_id: "tool-1".into(),
                product_type: ProductType::Tool,
                name: "Wrench".into(),
                unit_amount_minor: 500,
                quantity: 2,
            }],
            success_url: "https://shop.test/success".into(),
            cancel_url: "https://shop.test/cancel".into(),
            customer_email: None,
            metadata: HashMap::new(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("lineItems").is_some());
        assert!(json.get("successUrl").is_some());
        // empty optional fields stay off the wire
        assert!(json.get("customerEmail").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_redirect_target_round_trip() {
        let target = RedirectTarget {
            session_id: Some("cks_abc".into()),
            redirect_url: "https://pay.test/pay/cks_abc".into(),
        };
        let json = serde_json::to_string(&target).unwrap();
        let back: RedirectTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }
}
