//! # Routes
//!
//! Axum router configuration for the checkout gateway.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - POST /api/v1/checkout - Create a payment session
/// - GET  /api/v1/sessions/{session_id} - Session status lookup
/// - POST /api/v1/sessions/{session_id}/refunds - Record a refund
/// - POST /api/v1/refunds/{refund_id}/result - Settle a refund
/// - POST /webhook/provider - Provider webhook receiver
/// - GET  /health - Health check
pub fn create_router(state: AppState) -> Router {
    // The checkout endpoint is called from storefront origins; webhooks
    // are server-to-server and skip CORS entirely.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/sessions/{session_id}", get(handlers::get_session))
        .route(
            "/sessions/{session_id}/refunds",
            post(handlers::create_refund),
        )
        .route("/refunds/{refund_id}/result", post(handlers::refund_result));

    // Webhook routes must accept the raw body for signature verification
    let webhook_routes = Router::new().route("/provider", post(handlers::provider_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
