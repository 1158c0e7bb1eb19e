//! Payment processor webhook endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use storefront_payments::{WebhookDisposition, WebhookEvent};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const HEADER_ID: &str = "webhook-id";
const HEADER_TIMESTAMP: &str = "webhook-timestamp";
const HEADER_SIGNATURE: &str = "webhook-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
}

/// Receive a payment event
///
/// The raw body is taken as bytes: the signature covers the exact bytes sent,
/// so it must be verified before any JSON parsing.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let webhook_id = required_header(&headers, HEADER_ID)?;
    let timestamp = required_header(&headers, HEADER_TIMESTAMP)?;
    let signature = required_header(&headers, HEADER_SIGNATURE)?;

    if let Err(e) = state
        .verifier
        .verify(webhook_id, timestamp, signature, &body)
    {
        tracing::warn!(
            webhook_id = %webhook_id,
            error = %e,
            "Rejected payment webhook - possible attack or misconfigured secret"
        );
        return Err(e.into());
    }

    let event = WebhookEvent::from_slice(&body).map_err(|e| {
        tracing::warn!(webhook_id = %webhook_id, error = %e, "Unparseable payment webhook body");
        ApiError::from(e)
    })?;

    let disposition = state.webhooks.handle_event(webhook_id, &event).await?;

    if let WebhookDisposition::Applied { order_id, outcome } = &disposition {
        tracing::debug!(
            webhook_id = %webhook_id,
            order_id = %order_id,
            outcome = %outcome,
            "Payment webhook applied"
        );
    }

    Ok(Json(WebhookAck { success: true }))
}

fn required_header<'a>(headers: &'a HeaderMap, name: &'static str) -> ApiResult<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            tracing::warn!(header = name, "Payment webhook missing header");
            ApiError::MissingHeader(name)
        })
}
