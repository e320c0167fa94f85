//! # Direct-Provider Backend
//!
//! Requests a hosted-checkout redirect straight from the payment
//! provider, skipping our own endpoints entirely. Sessions created this
//! way have no `PaymentSessionStore` entry, so the backend only enters
//! the chain when `direct_provider.enabled` is set in the client config.

use crate::config::DirectProviderConfig;
use checkout_core::{
    CheckoutBackend, CheckoutError, CheckoutPayload, CheckoutResult, RedirectTarget,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Provider session response
#[derive(Debug, Deserialize)]
struct ProviderSession {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

/// Session creation against the provider's public API
pub struct DirectProviderBackend {
    config: DirectProviderConfig,
    client: Client,
}

impl DirectProviderBackend {
    pub fn new(config: DirectProviderConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Flatten the payload into the provider's bracketed form encoding
    fn build_form(&self, payload: &CheckoutPayload) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), payload.success_url.clone()),
            ("cancel_url".to_string(), payload.cancel_url.clone()),
        ];

        for (i, item) in payload.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount_minor.to_string(),
            ));
            form.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            form.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }

        if let Some(email) = &payload.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        for (key, value) in &payload.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        form
    }
}

#[async_trait::async_trait]
impl CheckoutBackend for DirectProviderBackend {
    #[instrument(skip(self, payload), fields(items = payload.line_items.len()))]
    async fn attempt(&self, payload: &CheckoutPayload) -> CheckoutResult<RedirectTarget> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        debug!("POST {} (direct provider)", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.publishable_key))
            .form(&self.build_form(payload))
            .send()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!("provider session creation failed: HTTP {}", status.as_u16());

            if status.is_client_error() {
                if let Ok(err) = serde_json::from_str::<ProviderErrorResponse>(&body) {
                    return Err(CheckoutError::InvalidRequest(err.error.message));
                }
            }
            return Err(CheckoutError::UpstreamUnavailable {
                backend: self.name().to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let session: ProviderSession = serde_json::from_str(&body).map_err(|e| {
            CheckoutError::MalformedResponse {
                backend: self.name().to_string(),
                message: format!("provider response: {}", e),
            }
        })?;

        debug!("provider session {} created", session.id);

        // No server-side bookkeeping on this path: the store never sees
        // the session, so no session_id is reported to the caller.
        Ok(RedirectTarget {
            session_id: None,
            redirect_url: session.url,
        })
    }

    fn name(&self) -> &str {
        "direct-provider"
    }
}
