//! # checkout-api
//!
//! HTTP API layer for checkout-orchestra.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The session-creation endpoint the client fallback chain targets
//! - The idempotent webhook receiver
//! - The refund surface
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/checkout` | Create payment session |
//! | GET | `/api/v1/sessions/{id}` | Session status lookup |
//! | POST | `/api/v1/sessions/{id}/refunds` | Record refund |
//! | POST | `/api/v1/refunds/{id}/result` | Settle refund |
//! | POST | `/webhook/provider` | Provider webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
