//! Payment webhook errors

use storefront_shared::StoreError;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Invalid webhook timestamp: {0}")]
    WebhookTimestampInvalid(String),

    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Whether the error means the webhook failed authentication
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::WebhookSignatureInvalid | Self::WebhookTimestampInvalid(_)
        )
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => Self::OrderNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Email(err.to_string())
    }
}
