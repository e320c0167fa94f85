//! # Application State
//!
//! Shared state for the Axum application: the session store, the
//! webhook processor, the refund ledger, and server configuration.

use checkout_store::{create_pool, PaymentSessionStore, RefundLedger, WebhookProcessor};
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// SQLite database path
    pub database_path: String,
    /// Shared secret for webhook signature verification (whsec_...)
    pub webhook_secret: String,
    /// Base URL of the provider's hosted checkout pages
    pub provider_checkout_base_url: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .map_err(|_| anyhow::anyhow!("WEBHOOK_SECRET not set"))?;
        if !webhook_secret.starts_with("whsec_") {
            anyhow::bail!("WEBHOOK_SECRET must start with whsec_");
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "checkout.db".to_string()),
            webhook_secret,
            provider_checkout_base_url: std::env::var("PROVIDER_CHECKOUT_BASE_URL")
                .unwrap_or_else(|_| "https://checkout.provider.example".to_string()),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Provider-hosted checkout page for a session
    pub fn hosted_checkout_url(&self, session_id: &str) -> String {
        format!(
            "{}/pay/{}",
            self.provider_checkout_base_url.trim_end_matches('/'),
            session_id
        )
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Durable payment sessions
    pub store: PaymentSessionStore,
    /// Webhook reconciliation
    pub processor: Arc<WebhookProcessor>,
    /// Refund ledger
    pub ledger: RefundLedger,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Build from environment configuration
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let pool = create_pool(&config.database_path)
            .map_err(|e| anyhow::anyhow!("failed to open store: {}", e))?;
        let store = PaymentSessionStore::new(pool)
            .map_err(|e| anyhow::anyhow!("failed to init store: {}", e))?;

        Ok(Self::assemble(store, config))
    }

    /// Build over an in-memory store (tests)
    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        let store = PaymentSessionStore::in_memory()
            .map_err(|e| anyhow::anyhow!("failed to init store: {}", e))?;
        Ok(Self::assemble(store, config))
    }

    fn assemble(store: PaymentSessionStore, config: AppConfig) -> Self {
        let processor = Arc::new(WebhookProcessor::new(
            store.clone(),
            config.webhook_secret.clone(),
        ));
        let ledger = RefundLedger::new(store.clone());
        Self {
            store,
            processor,
            ledger,
            config,
        }
    }
}
