//! # Refund Records
//!
//! Ledger entries for partial or full refunds against a paid session.
//! Invariant: the sum of completed refund amounts for a session never
//! exceeds the session's `amount_total_minor`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a refund request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Completed => "completed",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RefundStatus::Pending),
            "completed" => Some(RefundStatus::Completed),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

/// A single refund request against a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    /// Opaque refund ID (`rf_` prefix)
    pub refund_id: String,

    /// Session this refund draws against
    pub session_id: String,

    /// Amount in minor units
    pub amount_minor: i64,

    /// Operator-supplied reason
    pub reason: String,

    pub status: RefundStatus,

    pub created_at: DateTime<Utc>,
}
