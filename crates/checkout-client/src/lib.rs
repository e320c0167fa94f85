//! # checkout-client
//!
//! Client-side half of the checkout-orchestra pipeline: given a cart
//! snapshot, obtain a redirectable checkout destination while tolerating
//! partial backend failure.
//!
//! The fallback chain, in order:
//!
//! 1. **Primary endpoint** — full payload to our session-creation API
//! 2. **Secondary endpoint** — identical payload to the mirror
//! 3. **Direct provider** — session straight from the provider
//!    (opt-in; sacrifices server-side bookkeeping)
//! 4. **Emergency probe** — alternate endpoints, one generic descriptor
//!
//! Retryable failures (network, timeout, 5xx, markup or unparsable
//! bodies) advance the chain; terminal failures (empty cart, structured
//! 4xx rejections) abort it immediately. Only the final exhaustion is
//! surfaced to the user.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use checkout_client::{CheckoutClientConfig, CheckoutOrchestrator};
//! use checkout_core::{snapshot, Currency};
//!
//! let config = CheckoutClientConfig::load("config/checkout.toml")?;
//! let orchestrator = CheckoutOrchestrator::from_config(&config)?;
//!
//! let items = snapshot(&cart_entries, Currency::USD)?;
//! let target = orchestrator.initiate_checkout(items, None).await?;
//! // redirect the browser to target.redirect_url
//! ```

pub mod config;
pub mod http_backend;
pub mod orchestrator;
pub mod probe;
pub mod provider;

// Re-exports
pub use config::{CheckoutClientConfig, DirectProviderConfig, ProbeConfig};
pub use http_backend::HttpCheckoutBackend;
pub use orchestrator::{CheckoutOrchestrator, CustomerHint};
pub use probe::EmergencyProbeBackend;
pub use provider::DirectProviderBackend;
