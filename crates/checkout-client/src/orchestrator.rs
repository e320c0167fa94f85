//! # Checkout Orchestrator
//!
//! Drives the ordered fallback chain: primary endpoint, mirror endpoint,
//! direct provider (opt-in), emergency probe. Steps run strictly
//! sequentially — never in parallel — so error classification stays
//! simple and two backends can never create concurrent sessions for one
//! cart. Each step is bounded by the configured per-step timeout, and a
//! timed-out step classifies exactly as a network failure.

use crate::config::CheckoutClientConfig;
use crate::http_backend::HttpCheckoutBackend;
use crate::probe::EmergencyProbeBackend;
use crate::provider::DirectProviderBackend;
use checkout_core::{
    CheckoutBackend, CheckoutError, CheckoutPayload, CheckoutResult, LineItem, RedirectTarget,
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Optional customer hint threaded into the provider's payment form
#[derive(Debug, Clone, Default)]
pub struct CustomerHint {
    pub email: Option<String>,
}

/// Sequential fallback chain over `CheckoutBackend` implementations
pub struct CheckoutOrchestrator {
    backends: Vec<Box<dyn CheckoutBackend>>,
    success_url: String,
    cancel_url: String,
    step_timeout: Duration,
    cancel: CancellationToken,
}

impl CheckoutOrchestrator {
    /// Build the chain described by the client config.
    ///
    /// The direct-provider backend joins the chain only when the config
    /// explicitly enables it; the probe joins only when endpoints are
    /// configured.
    pub fn from_config(config: &CheckoutClientConfig) -> CheckoutResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.step_timeout())
            .build()
            .map_err(|e| CheckoutError::Configuration(e.to_string()))?;

        let mut backends: Vec<Box<dyn CheckoutBackend>> = vec![
            Box::new(HttpCheckoutBackend::new(
                "primary",
                config.primary_url.clone(),
                client.clone(),
            )),
            Box::new(HttpCheckoutBackend::new(
                "secondary",
                config.secondary_url.clone(),
                client.clone(),
            )),
        ];

        if let Some(provider) = &config.direct_provider {
            if provider.enabled {
                backends.push(Box::new(DirectProviderBackend::new(
                    provider.clone(),
                    client.clone(),
                )));
            }
        }

        if !config.probe.endpoints.is_empty() {
            backends.push(Box::new(EmergencyProbeBackend::new(
                config.probe.endpoints.clone(),
                config.probe_budget(),
                client,
            )));
        }

        Ok(Self {
            backends,
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            step_timeout: config.step_timeout(),
            cancel: CancellationToken::new(),
        })
    }

    /// Assemble a chain directly (tests, custom topologies)
    pub fn new(
        backends: Vec<Box<dyn CheckoutBackend>>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            backends,
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            step_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Token the caller can trip to abort an in-flight chain (user
    /// navigated away). No further backends run once cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Obtain a redirectable checkout destination for the given items.
    ///
    /// Terminal errors abort immediately; retryable errors advance the
    /// chain; only the final exhaustion is surfaced when every backend
    /// fails retryably.
    #[instrument(skip(self, items, hint), fields(items = items.len(), backends = self.backends.len()))]
    pub async fn initiate_checkout(
        &self,
        items: Vec<LineItem>,
        hint: Option<CustomerHint>,
    ) -> CheckoutResult<RedirectTarget> {
        // Terminal before any network traffic
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let payload = CheckoutPayload {
            line_items: items,
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            customer_email: hint.and_then(|h| h.email),
            metadata: HashMap::new(),
        };

        let mut last_failure = String::from("no backends configured");

        for backend in &self.backends {
            if self.cancel.is_cancelled() {
                return Err(CheckoutError::Cancelled);
            }

            let step = tokio::time::timeout(self.step_timeout, backend.attempt(&payload));

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CheckoutError::Cancelled),
                outcome = step => outcome,
            };

            match outcome {
                Ok(Ok(target)) => {
                    info!("checkout via {}: {}", backend.name(), target.redirect_url);
                    return Ok(target);
                }
                Ok(Err(e)) if e.is_retryable() => {
                    debug!("{} retryable: {}", backend.name(), e);
                    last_failure = format!("{}: {}", backend.name(), e);
                }
                Ok(Err(e)) => {
                    warn!("{} terminal: {}", backend.name(), e);
                    return Err(e);
                }
                Err(_) => {
                    debug!("{} timed out after {:?}", backend.name(), self.step_timeout);
                    last_failure = format!("{}: timed out", backend.name());
                }
            }
        }

        warn!("fallback chain exhausted: {}", last_failure);
        Err(CheckoutError::ChainExhausted { last: last_failure })
    }
}
