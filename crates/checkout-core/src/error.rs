//! # Checkout Error Types
//!
//! Typed error handling for the checkout pipeline.
//! All operations return `Result<T, CheckoutError>`.
//!
//! Errors fall into two classes that drive the client fallback chain:
//! **terminal** errors abort the chain immediately, **retryable** errors
//! advance it to the next backend. `is_retryable()` is the single source
//! of truth for that classification.

use thiserror::Error;

/// Core error type for all checkout operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Cart has no entries — user-correctable, aborts the chain
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart entry failed validation (quantity, price, name)
    #[error("Invalid line item: {0}")]
    InvalidLineItem(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data rejected by a backend (structured 4xx body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network/HTTP transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with markup or an unparsable body
    #[error("Malformed response from {backend}: {message}")]
    MalformedResponse { backend: String, message: String },

    /// Backend answered 5xx
    #[error("Upstream unavailable [{backend}]: {message}")]
    UpstreamUnavailable { backend: String, message: String },

    /// Every backend in the fallback chain failed retryably
    #[error("Checkout failed: all backends exhausted (last: {last})")]
    ChainExhausted { last: String },

    /// Caller cancelled the in-flight checkout attempt
    #[error("Checkout cancelled")]
    Cancelled,

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    Verification(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Webhook referenced a session the store has never seen
    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: String },

    /// Session not found in the store
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Status change violates the session state machine
    #[error("Illegal transition for session {session_id}: {from} -> {to}")]
    IllegalTransition {
        session_id: String,
        from: String,
        to: String,
    },

    /// Refund requested against a session that is not paid
    #[error("Invalid session state for refund: session {session_id} is {state}")]
    InvalidSessionState { session_id: String, state: String },

    /// Refund would push cumulative refunds past the session total
    #[error(
        "Over-refund on session {session_id}: {requested} requested, {available} available"
    )]
    OverRefund {
        session_id: String,
        requested: i64,
        available: i64,
    },

    /// Refund record not found in the ledger
    #[error("Refund not found: {refund_id}")]
    RefundNotFound { refund_id: String },

    /// Storage-layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CheckoutError {
    /// Returns true if the fallback chain may proceed to the next backend
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::Network(_)
                | CheckoutError::MalformedResponse { .. }
                | CheckoutError::UpstreamUnavailable { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::EmptyCart => 400,
            CheckoutError::InvalidLineItem(_) => 400,
            CheckoutError::Configuration(_) => 500,
            CheckoutError::InvalidRequest(_) => 400,
            CheckoutError::Network(_) => 503,
            CheckoutError::MalformedResponse { .. } => 502,
            CheckoutError::UpstreamUnavailable { .. } => 502,
            CheckoutError::ChainExhausted { .. } => 503,
            CheckoutError::Cancelled => 499,
            CheckoutError::Verification(_) => 400,
            CheckoutError::WebhookParse(_) => 400,
            CheckoutError::UnknownSession { .. } => 404,
            CheckoutError::SessionNotFound { .. } => 404,
            CheckoutError::IllegalTransition { .. } => 409,
            CheckoutError::InvalidSessionState { .. } => 409,
            CheckoutError::OverRefund { .. } => 422,
            CheckoutError::RefundNotFound { .. } => 404,
            CheckoutError::Storage(_) => 500,
            CheckoutError::Serialization(_) => 500,
        }
    }
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;
