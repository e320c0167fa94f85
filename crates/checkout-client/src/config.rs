//! # Client Configuration
//!
//! `CheckoutClientConfig` is built once at startup and passed into the
//! orchestrator explicitly — no live global "publishable key" or
//! "initialized" flag anywhere. That keeps the fallback chain
//! unit-testable without patching shared state.

use checkout_core::{CheckoutError, CheckoutResult};
use serde::Deserialize;
use std::time::Duration;

/// Default per-step latency bound for the fallback chain
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 5;

/// Default total budget for the emergency probe
pub const DEFAULT_PROBE_BUDGET_SECS: u64 = 10;

/// Configuration for the client-side checkout orchestrator
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutClientConfig {
    /// Primary session-creation endpoint
    pub primary_url: String,

    /// Mirror endpoint, tried after the primary fails retryably
    pub secondary_url: String,

    /// Where the provider sends the customer after payment
    pub success_url: String,

    /// Where the provider sends the customer on cancel
    pub cancel_url: String,

    /// Per-step latency bound (request + classification), seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Direct-provider fallback — disabled unless explicitly configured
    #[serde(default)]
    pub direct_provider: Option<DirectProviderConfig>,

    /// Emergency probe endpoints, tried last with one generic descriptor
    #[serde(default)]
    pub probe: ProbeConfig,
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

/// Direct-provider session creation (no server round-trip).
///
/// Off by default: sessions created this way never reach the
/// `PaymentSessionStore`, so enabling it trades bookkeeping for
/// availability.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectProviderConfig {
    /// Must be explicitly set to place this backend in the chain
    #[serde(default)]
    pub enabled: bool,

    /// Publishable key (pk_test_... or pk_live_...)
    pub publishable_key: String,

    /// Provider API base URL
    pub api_base_url: String,
}

impl DirectProviderConfig {
    /// Validate the publishable key format
    pub fn validate(&self) -> CheckoutResult<()> {
        if !self.publishable_key.starts_with("pk_test_")
            && !self.publishable_key.starts_with("pk_live_")
        {
            return Err(CheckoutError::Configuration(
                "publishable_key must start with pk_test_ or pk_live_".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_test_mode(&self) -> bool {
        self.publishable_key.starts_with("pk_test_")
    }
}

/// Emergency probe topology
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeConfig {
    /// Ordered list of last-resort endpoints
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Total budget shared across all probe endpoints, seconds
    #[serde(default = "default_probe_budget")]
    pub total_budget_secs: u64,
}

fn default_probe_budget() -> u64 {
    DEFAULT_PROBE_BUDGET_SECS
}

impl CheckoutClientConfig {
    /// Parse from a TOML string
    pub fn from_toml(toml_str: &str) -> CheckoutResult<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| CheckoutError::Configuration(format!("bad client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, with `CHECKOUT_CONFIG` overriding the path
    pub fn load(default_path: &str) -> CheckoutResult<Self> {
        dotenvy::dotenv().ok();
        let path =
            std::env::var("CHECKOUT_CONFIG").unwrap_or_else(|_| default_path.to_string());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CheckoutError::Configuration(format!("cannot read {}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Validate endpoint and provider settings
    pub fn validate(&self) -> CheckoutResult<()> {
        for (field, url) in [
            ("primary_url", &self.primary_url),
            ("secondary_url", &self.secondary_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CheckoutError::Configuration(format!(
                    "{} must be an absolute http(s) URL",
                    field
                )));
            }
        }
        if let Some(provider) = &self.direct_provider {
            if provider.enabled {
                provider.validate()?;
            }
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn probe_budget(&self) -> Duration {
        Duration::from_secs(self.probe.total_budget_secs)
    }

    /// True if the direct-provider backend belongs in the chain
    pub fn direct_provider_enabled(&self) -> bool {
        self.direct_provider.as_ref().is_some_and(|p| p.enabled)
    }
}
