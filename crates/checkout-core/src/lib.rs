//! # checkout-core
//!
//! Core types and traits for the checkout-orchestra payment pipeline.
//!
//! This crate provides:
//! - `CartEntry` / `LineItem` and the cart snapshot builder
//! - `PaymentSession` with its two status state machines
//! - `CheckoutBackend` trait for session-creation strategies
//! - `WebhookEvent` / `WebhookOutcome` for asynchronous reconciliation
//! - `RefundRecord` for the refund ledger
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::{snapshot, CartEntry, Currency};
//!
//! // Snapshot the persisted cart into provider-agnostic line items
//! let items = snapshot(&cart_entries, Currency::USD)?;
//!
//! // Drive the fallback chain (see checkout-client)
//! let target = orchestrator.initiate_checkout(items, Some(hint)).await?;
//!
//! // Redirect the browser to target.redirect_url
//! ```

pub mod backend;
pub mod cart;
pub mod error;
pub mod refund;
pub mod session;
pub mod webhook;

// Re-exports for convenience
pub use backend::{CheckoutBackend, CheckoutPayload, RedirectTarget};
pub use cart::{snapshot, total_minor, CartEntry, Currency, LineItem, ProductType};
pub use error::{CheckoutError, CheckoutResult};
pub use refund::{RefundRecord, RefundStatus};
pub use session::{
    new_refund_id, new_session_id, PaymentSession, PaymentStatus, SessionStatus,
};
pub use webhook::{IgnoreReason, WebhookEvent, WebhookEventType, WebhookOutcome};
