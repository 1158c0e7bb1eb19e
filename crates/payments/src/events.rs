//! Payment webhook event payloads

use serde::Deserialize;
use serde_json::Value;
use storefront_shared::PaymentOutcome;

use crate::error::{PaymentError, PaymentResult};

pub const PAYMENT_SUCCEEDED: &str = "checkout.payment.succeeded";
pub const PAYMENT_FAILED: &str = "checkout.payment.failed";
pub const PAYMENT_CANCELLED: &str = "checkout.payment.cancelled";

/// Webhook body sent by the payment processor
///
/// Only `type` is required. `data` is read leniently: a missing, null or
/// differently shaped payload yields empty fields rather than a parse error,
/// so event types this service ignores are still acknowledged.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawEvent")]
pub struct WebhookEvent {
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventData {
    /// Payment identifier at the processor
    pub id: Option<String>,
    pub metadata: EventMetadata,
}

/// Metadata attached to the checkout session when it was created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

impl From<RawEvent> for WebhookEvent {
    fn from(raw: RawEvent) -> Self {
        let metadata = raw.data.get("metadata");
        Self {
            event_type: raw.event_type,
            data: EventData {
                id: string_field(Some(&raw.data), "id"),
                metadata: EventMetadata {
                    order_id: string_field(metadata, "orderId"),
                    order_number: string_field(metadata, "orderNumber"),
                    customer_email: string_field(metadata, "customerEmail"),
                },
            },
        }
    }
}

/// String value of `key`; absent, null and non-string values are `None`
fn string_field(object: Option<&Value>, key: &str) -> Option<String> {
    object
        .and_then(|value| value.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl WebhookEvent {
    /// Parse the raw (already verified) request body
    pub fn from_slice(payload: &[u8]) -> PaymentResult<Self> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
    }

    /// Payment outcome for recognized event types
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self.event_type.as_str() {
            PAYMENT_SUCCEEDED => Some(PaymentOutcome::Succeeded),
            PAYMENT_FAILED => Some(PaymentOutcome::Failed),
            PAYMENT_CANCELLED => Some(PaymentOutcome::Cancelled),
            _ => None,
        }
    }

    /// Order reference from the metadata; blank values count as missing
    pub fn order_id(&self) -> Option<&str> {
        non_blank(self.data.metadata.order_id.as_deref())
    }

    pub fn payment_id(&self) -> Option<&str> {
        non_blank(self.data.id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
