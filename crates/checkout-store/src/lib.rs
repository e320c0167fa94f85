//! # checkout-store
//!
//! Server-side half of the checkout-orchestra pipeline: durable payment
//! sessions, idempotent webhook reconciliation, and the refund ledger,
//! all over a pooled SQLite store.
//!
//! The invariants this crate defends:
//!
//! - a session and its line items are created atomically, and the line
//!   items never change afterwards
//! - status transitions only move along legal state-machine edges;
//!   applying a mutation twice is observably the same as once
//! - webhook deliveries are at-least-once, but each `event_id` is
//!   applied at most once — the dedup guard is a unique-constraint
//!   insert, not a check-then-act sequence
//! - completed refunds for a session never exceed its total
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use checkout_store::{create_pool, PaymentSessionStore, WebhookProcessor, RefundLedger};
//!
//! let store = PaymentSessionStore::new(create_pool("checkout.db")?)?;
//! let session = store.create(Some(user_id), items, Currency::USD)?;
//!
//! // webhook receiver:
//! let processor = WebhookProcessor::new(store.clone(), webhook_secret);
//! let outcome = processor.handle(&body, &signature_header)?;
//! ```

pub mod refund;
pub mod schema;
pub mod signature;
pub mod store;
pub mod webhook;

// Re-exports
pub use refund::RefundLedger;
pub use store::{create_pool, DbPool, PaymentSessionStore};
pub use webhook::{LoggingHooks, SettlementHooks, WebhookProcessor};
