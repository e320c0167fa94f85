//! # Request Handlers
//!
//! Axum request handlers for the session-creation endpoint, the webhook
//! receiver, session lookup, and the refund surface.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use checkout_core::{CheckoutError, CheckoutPayload, Currency, RedirectTarget, WebhookOutcome};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Structured error body: `{ message, code }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code,
            details: None,
        }
    }
}

/// Refund creation request
#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    /// Amount in the smallest currency unit
    #[serde(rename = "amountMinorUnits")]
    pub amount_minor_units: i64,
    /// Why the refund was initiated
    #[serde(default)]
    pub reason: String,
}

/// Refund settlement request
#[derive(Debug, Deserialize)]
pub struct RefundResultRequest {
    pub success: bool,
}

/// Webhook receiver acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub applied: bool,
}

fn error_to_response(err: CheckoutError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkout-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a payment session from a checkout payload.
///
/// The session and its line items persist atomically; the response
/// carries the provider-hosted redirect. An optional `x-user-id` header
/// attributes the session to an authenticated user — anonymous carts
/// work without it.
#[instrument(skip(state, headers, payload), fields(items = payload.line_items.len()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Json<RedirectTarget>, (StatusCode, Json<ErrorResponse>)> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    let currency = payload
        .metadata
        .get("currency")
        .and_then(|c| Currency::parse(c))
        .unwrap_or_default();

    let session = state
        .store
        .create(user_id, payload.line_items, currency)
        .map_err(|e| {
            error!("session creation failed: {}", e);
            error_to_response(e)
        })?;

    info!(
        "created session {} for user {:?}",
        session.session_id, user_id
    );

    Ok(Json(RedirectTarget {
        redirect_url: state.config.hosted_checkout_url(&session.session_id),
        session_id: Some(session.session_id),
    }))
}

/// Look up a session's current state (client polling after redirect)
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let session = state
        .store
        .find(&session_id)
        .map_err(error_to_response)?
        .ok_or_else(|| {
            error_to_response(CheckoutError::SessionNotFound {
                session_id: session_id.clone(),
            })
        })?;

    Ok(Json(session))
}

/// Provider webhook receiver.
///
/// Responses follow the reconciliation contract: 200 for applied or
/// ignored-duplicate deliveries, 400 for verification failures, 404 for
/// unknown sessions (logged and acknowledged so the provider stops
/// retrying).
#[instrument(skip(state, headers, body))]
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get("provider-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Provider-Signature header", 400)),
            )
        })?;

    match state.processor.handle(&body, signature) {
        Ok(WebhookOutcome::Applied) => Ok((
            StatusCode::OK,
            Json(WebhookAck {
                received: true,
                applied: true,
            }),
        )),
        Ok(WebhookOutcome::Ignored { reason }) => {
            info!("webhook ignored: {:?}", reason);
            Ok((
                StatusCode::OK,
                Json(WebhookAck {
                    received: true,
                    applied: false,
                }),
            ))
        }
        Err(e) => {
            error!("webhook rejected: {}", e);
            Err(error_to_response(e))
        }
    }
}

/// Record a refund against a session
#[instrument(skip(state, request))]
pub async fn create_refund(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CreateRefundRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let record = state
        .ledger
        .create_refund(&session_id, request.amount_minor_units, &request.reason)
        .map_err(|e| {
            error!("refund creation failed on {}: {}", session_id, e);
            error_to_response(e)
        })?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// Settle a refund with the provider's result
#[instrument(skip(state, request))]
pub async fn refund_result(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
    Json(request): Json<RefundResultRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let record = state
        .ledger
        .apply_refund_result(&refund_id, request.success)
        .map_err(|e| {
            error!("refund settlement failed on {}: {}", refund_id, e);
            error_to_response(e)
        })?;

    Ok(Json(record))
}
