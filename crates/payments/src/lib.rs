// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storefront Payments Module
//!
//! Turns payment processor webhooks into order state.
//!
//! ## Features
//!
//! - **Signature Verification**: HMAC-SHA256 over `id.timestamp.body` with a freshness window
//! - **Order Finalization**: Idempotent, race-safe payment transitions
//! - **Webhook Ledger**: Each event id is processed once; failed events can be redelivered
//! - **Email Notifications**: Best-effort order confirmation after payment

pub mod email;
pub mod error;
pub mod events;
pub mod notifications;
pub mod signature;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Email
pub use email::{
    format_money, EmailConfig, OrderConfirmation, OrderEmailService, OrderNotifier, RenderedEmail,
};

// Error
pub use error::{PaymentError, PaymentResult};

// Events
pub use events::{
    EventData, EventMetadata, WebhookEvent, PAYMENT_CANCELLED, PAYMENT_FAILED, PAYMENT_SUCCEEDED,
};

// Notifications
pub use notifications::{NotificationQueue, DEFAULT_QUEUE_CAPACITY};

// Signature
pub use signature::{WebhookVerifier, DEFAULT_TOLERANCE_SECS, SECRET_PREFIX};

// Webhooks
pub use webhooks::{WebhookDisposition, WebhookHandler};
