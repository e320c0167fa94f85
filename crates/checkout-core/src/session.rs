//! # Payment Session
//!
//! The durable record of a single checkout attempt and its two
//! independent status axes:
//!
//! - `SessionStatus` — lifecycle view: `pending -> completed | failed |
//!   cancelled`, terminal states final.
//! - `PaymentStatus` — provider view: `unpaid -> paid | failed`,
//!   `paid -> refund_pending -> refunded` (with a `refund_pending ->
//!   paid` recovery edge for provider-side refund failure).
//!
//! Legal edges live here, next to the types, so the store and the
//! webhook processor share one definition of the machine.

use crate::cart::{total_minor, Currency, LineItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, awaiting payment
    Pending,
    /// Payment completed successfully
    Completed,
    /// Payment failed
    Failed,
    /// Customer cancelled
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }

    /// True if `self -> to` is a legal edge. A state may always
    /// transition onto itself (idempotent no-op).
    pub fn can_transition(&self, to: SessionStatus) -> bool {
        if *self == to {
            return true;
        }
        matches!(self, SessionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Payment-provider view of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    RefundPending,
    Refunded,
}

impl PaymentStatus {
    /// True if `self -> to` is a legal edge. Same-state transitions are
    /// legal no-ops; `refund_pending -> paid` is the recovery edge taken
    /// when the provider rejects a full refund.
    pub fn can_transition(&self, to: PaymentStatus) -> bool {
        if *self == to {
            return true;
        }
        matches!(
            (self, to),
            (PaymentStatus::Unpaid, PaymentStatus::Paid)
                | (PaymentStatus::Unpaid, PaymentStatus::Failed)
                | (PaymentStatus::Paid, PaymentStatus::RefundPending)
                | (PaymentStatus::RefundPending, PaymentStatus::Refunded)
                | (PaymentStatus::RefundPending, PaymentStatus::Paid)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::RefundPending => "refund_pending",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refund_pending" => Some(PaymentStatus::RefundPending),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// A payment session. `session_id` is opaque, externally unguessable and
/// immutable; it is the idempotency key for every later operation.
///
/// Invariant: `amount_total_minor == Σ(unit_amount_minor × quantity)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Opaque session ID (`cks_` + UUID entropy)
    pub session_id: String,

    /// Owning user, if the checkout was authenticated
    pub user_id: Option<i64>,

    /// Line items, immutable once attached
    pub items: Vec<LineItem>,

    /// Total in minor units
    pub amount_total_minor: i64,

    /// Currency
    pub currency: Currency,

    /// Provider view
    pub payment_status: PaymentStatus,

    /// Lifecycle view
    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Stamped by `mark_completed`
    pub completed_at: Option<DateTime<Utc>>,

    /// Stamped by `mark_failed`
    pub failure_reason: Option<String>,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PaymentSession {
    /// Build a fresh pending session over a snapshot's line items.
    pub fn new(user_id: Option<i64>, items: Vec<LineItem>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            session_id: new_session_id(),
            user_id,
            amount_total_minor: total_minor(&items),
            items,
            currency,
            payment_status: PaymentStatus::Unpaid,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failure_reason: None,
            metadata: HashMap::new(),
        }
    }

    /// Verify the amount-total invariant
    pub fn total_is_consistent(&self) -> bool {
        self.amount_total_minor == total_minor(&self.items)
    }
}

/// Generate an unguessable session identifier (`cks_` prefix, UUID v4
/// entropy, hyphens stripped)
pub fn new_session_id() -> String {
    format!("cks_{}", Uuid::new_v4().simple())
}

/// Generate a refund identifier
pub fn new_refund_id() -> String {
    format!("rf_{}", Uuid::new_v4().simple())
}
