//! # Emergency Probe Backend
//!
//! Final resort of the fallback chain: a short ordered list of alternate
//! endpoints, tried with a single generic descriptor standing in for the
//! whole cart, under one shared time budget. By the time this runs, both
//! of our endpoints and (if enabled) the provider itself have failed —
//! the probe trades line-item fidelity for any chance of completing the
//! purchase.

use crate::http_backend::classify_response;
use checkout_core::{
    total_minor, CheckoutBackend, CheckoutError, CheckoutPayload, CheckoutResult, LineItem,
    ProductType, RedirectTarget,
};
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Display name of the collapsed descriptor sent to probe endpoints
const FALLBACK_DESCRIPTOR: &str = "Order total";

/// Last-resort probe across alternate endpoints
pub struct EmergencyProbeBackend {
    endpoints: Vec<String>,
    total_budget: Duration,
    client: Client,
}

impl EmergencyProbeBackend {
    pub fn new(endpoints: Vec<String>, total_budget: Duration, client: Client) -> Self {
        Self {
            endpoints,
            total_budget,
            client,
        }
    }

    /// Collapse the cart into one generic line so a minimal endpoint can
    /// still price the order correctly.
    fn generic_payload(payload: &CheckoutPayload) -> CheckoutPayload {
        CheckoutPayload {
            line_items: vec![LineItem {
                product_id: "fallback-order".to_string(),
                product_type: ProductType::Tool,
                name: FALLBACK_DESCRIPTOR.to_string(),
                unit_amount_minor: total_minor(&payload.line_items),
                quantity: 1,
            }],
            success_url: payload.success_url.clone(),
            cancel_url: payload.cancel_url.clone(),
            customer_email: payload.customer_email.clone(),
            metadata: payload.metadata.clone(),
        }
    }
}

#[async_trait::async_trait]
impl CheckoutBackend for EmergencyProbeBackend {
    #[instrument(skip(self, payload), fields(endpoints = self.endpoints.len()))]
    async fn attempt(&self, payload: &CheckoutPayload) -> CheckoutResult<RedirectTarget> {
        if self.endpoints.is_empty() {
            return Err(CheckoutError::Network(
                "no probe endpoints configured".to_string(),
            ));
        }

        let generic = Self::generic_payload(payload);
        let deadline = Instant::now() + self.total_budget;
        let mut last_error = CheckoutError::Network("probe budget exhausted".to_string());

        for endpoint in &self.endpoints {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("probe budget exhausted before {}", endpoint);
                break;
            }

            debug!("probing {} ({}ms left)", endpoint, remaining.as_millis());

            let attempt = async {
                let response = self
                    .client
                    .post(endpoint)
                    .json(&generic)
                    .send()
                    .await
                    .map_err(|e| CheckoutError::Network(e.to_string()))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| CheckoutError::Network(e.to_string()))?;
                classify_response("probe", status, &body)
            };

            match tokio::time::timeout(remaining, attempt).await {
                Ok(Ok(target)) => return Ok(target),
                Ok(Err(e)) if e.is_retryable() => {
                    warn!("probe {} failed: {}", endpoint, e);
                    last_error = e;
                }
                // A structured rejection means the payload itself is bad;
                // no other probe endpoint will disagree.
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!("probe {} timed out", endpoint);
                    last_error =
                        CheckoutError::Network(format!("{}: probe timed out", endpoint));
                }
            }
        }

        Err(last_error)
    }

    fn name(&self) -> &str {
        "emergency-probe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> CheckoutPayload {
        CheckoutPayload {
            line_items: vec![
                LineItem {
                    product_id: "a".into(),
                    product_type: ProductType::Tool,
                    name: "A".into(),
                    unit_amount_minor: 1000,
                    quantity: 2,
                },
                LineItem {
                    product_id: "b".into(),
                    product_type: ProductType::Course,
                    name: "B".into(),
                    unit_amount_minor: 2500,
                    quantity: 1,
                },
            ],
            success_url: "https://shop.test/success".into(),
            cancel_url: "https://shop.test/cancel".into(),
            customer_email: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_generic_payload_collapses_cart() {
        let generic = EmergencyProbeBackend::generic_payload(&payload());
        assert_eq!(generic.line_items.len(), 1);
        assert_eq!(generic.line_items[0].unit_amount_minor, 4500);
        assert_eq!(generic.line_items[0].quantity, 1);
        assert_eq!(generic.line_items[0].name, FALLBACK_DESCRIPTOR);
    }

    #[tokio::test]
    async fn test_probe_walks_endpoint_list() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessionId": "cks_probe",
                "redirectUrl": "https://pay.test/pay/cks_probe"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let probe = EmergencyProbeBackend::new(
            vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())],
            Duration::from_secs(5),
            Client::new(),
        );

        let target = probe.attempt(&payload()).await.unwrap();
        assert_eq!(target.session_id.as_deref(), Some("cks_probe"));
    }

    #[tokio::test]
    async fn test_probe_sends_single_generic_descriptor() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/only"))
            .and(body_partial_json(serde_json::json!({
                "lineItems": [{"name": FALLBACK_DESCRIPTOR, "quantity": 1}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessionId": "cks_x",
                "redirectUrl": "https://pay.test/pay/cks_x"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let probe = EmergencyProbeBackend::new(
            vec![format!("{}/only", server.uri())],
            Duration::from_secs(5),
            Client::new(),
        );

        probe.attempt(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_terminal_error_short_circuits() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "rejected",
                "code": 400
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let probe = EmergencyProbeBackend::new(
            vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())],
            Duration::from_secs(5),
            Client::new(),
        );

        let err = probe.attempt(&payload()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    }
}
