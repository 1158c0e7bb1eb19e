// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storefront shared domain and storage
//!
//! Order model, the payment-driven order state machine, and the storage ports
//! used by the API and worker binaries, together with PostgreSQL and
//! in-memory adapters.

pub mod db;
pub mod error;
pub mod order;
pub mod store;
pub mod webhook_event;

pub use db::{create_pool, run_migrations};
pub use error::{StoreError, StoreResult};
pub use order::{
    NewOrder, Order, OrderItem, OrderStatus, PaymentOutcome, PaymentStatus, ShippingAddress,
    TransitionDecision,
};
pub use store::{
    InMemoryStore, OrderStore, PgStore, TransitionOutcome, WebhookLedger,
    STUCK_PROCESSING_TIMEOUT_MINUTES,
};
pub use webhook_event::{ProcessingResult, WebhookEventRecord};
