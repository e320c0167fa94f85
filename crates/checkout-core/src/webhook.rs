//! # Webhook Event Types
//!
//! The provider delivers status changes at-least-once; `event_id` is
//! globally unique across all time and is the replay-detection key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider event types the processor acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    /// Payment succeeded — session moves to paid/completed
    PaymentSucceeded,
    /// Payment failed — session moves to failed/failed
    PaymentFailed,
    /// Customer abandoned the hosted page — session cancelled
    CheckoutCancelled,
    /// Unknown event (recorded, never applied)
    Unknown(String),
}

impl WebhookEventType {
    /// Map the provider's dotted type string
    pub fn from_provider_type(s: &str) -> Self {
        match s {
            "checkout.session.paid" => WebhookEventType::PaymentSucceeded,
            "checkout.session.payment_failed" => WebhookEventType::PaymentFailed,
            "checkout.session.cancelled" => WebhookEventType::CheckoutCancelled,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::PaymentSucceeded => "checkout.session.paid",
            WebhookEventType::PaymentFailed => "checkout.session.payment_failed",
            WebhookEventType::CheckoutCancelled => "checkout.session.cancelled",
            WebhookEventType::Unknown(s) => s.as_str(),
        }
    }
}

/// A verified, parsed webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider-issued event ID, globally unique
    pub event_id: String,

    /// Event type
    pub event_type: WebhookEventType,

    /// Session the event refers to
    pub session_id: String,

    /// When we received it
    pub received_at: DateTime<Utc>,

    /// When its transition was applied; `None` until applied (or forever,
    /// for audit-only records)
    pub applied_at: Option<DateTime<Utc>>,

    /// Raw provider payload, kept for audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

/// Outcome of processing a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event's transition was applied
    Applied,
    /// Nothing was applied — duplicate delivery, unknown event type, or
    /// an out-of-order event that would take an illegal edge
    Ignored { reason: IgnoreReason },
}

/// Why an acknowledged event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `event_id` was already recorded as applied
    Duplicate,
    /// Event type carries no transition for us
    UnknownEventType,
    /// The transition would take an illegal edge (out-of-order delivery)
    IllegalEdge,
}
