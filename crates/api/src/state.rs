//! Application state

use std::sync::Arc;

use storefront_payments::{PaymentResult, WebhookHandler, WebhookVerifier};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<WebhookVerifier>,
    pub webhooks: Arc<WebhookHandler>,
}

impl AppState {
    /// Fails if the configured webhook secret cannot be decoded
    pub fn new(config: Config, webhooks: WebhookHandler) -> PaymentResult<Self> {
        let verifier = WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance_secs)?;
        tracing::info!(
            tolerance_secs = verifier.tolerance_secs(),
            "Payment webhook verification enabled"
        );

        Ok(Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            webhooks: Arc::new(webhooks),
        })
    }
}
