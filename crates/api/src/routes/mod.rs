//! API routes

mod health;
mod webhooks;


use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub use health::health;
pub use webhooks::{payment_webhook, WebhookAck};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/payments", post(payment_webhook))
        .with_state(state)
}
