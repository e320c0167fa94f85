//! # Checkout Gateway
//!
//! Server-side entrypoint for checkout-orchestra: payment sessions,
//! webhook reconciliation, refunds.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export WEBHOOK_SECRET=whsec_...
//! export DATABASE_PATH=checkout.db
//! export PROVIDER_CHECKOUT_BASE_URL=https://checkout.provider.example
//!
//! # Run the server
//! checkout-gateway
//! ```

use checkout_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Store: {}", state.config.database_path);

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("checkout-gateway starting on http://{}", addr);

    if !is_prod {
        info!("Checkout: POST http://{}/api/v1/checkout", addr);
        info!("Webhook:  POST http://{}/webhook/provider", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
