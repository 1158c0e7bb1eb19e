//! Storage ports
//!
//! Handlers receive these as `Arc<dyn ...>` so tests can swap the PostgreSQL
//! adapter for the in-memory one.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::order::{NewOrder, Order, PaymentOutcome};
use crate::webhook_event::{ProcessingResult, WebhookEventRecord};

/// A claim stuck in `processing` for longer than this may be taken over
pub const STUCK_PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Result of a conditional payment transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// This call moved the order; carries the updated order
    Applied(Order),
    /// The order already carried the outcome's payment status; nothing written
    AlreadyApplied(Order),
    /// The order left the payment window with a different result; nothing written
    Conflict(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Applied(order) | Self::AlreadyApplied(order) | Self::Conflict(order) => order,
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<Order>>;

    async fn create(&self, order: NewOrder) -> StoreResult<Order>;

    /// Returns `false` when no order had that id
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Apply a payment outcome as a single conditional write keyed by order id.
    ///
    /// The write only happens while the order is `pending` or
    /// `pending_payment`; concurrent callers racing on the same order see
    /// exactly one `Applied`. Fails with `StoreError::OrderNotFound` when the
    /// order does not exist.
    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
        payment_id: Option<&str>,
    ) -> StoreResult<TransitionOutcome>;

    /// Cancel `pending_payment` orders last touched before `cutoff`; returns their ids
    async fn expire_pending_checkouts(&self, cutoff: OffsetDateTime) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait WebhookLedger: Send + Sync {
    /// Atomically claim exclusive processing rights for an event.
    ///
    /// Succeeds for a new event id, for an event whose last attempt ended in
    /// `error`, and for an event stuck in `processing` for longer than
    /// [`STUCK_PROCESSING_TIMEOUT_MINUTES`]. Returns `false` otherwise.
    async fn claim(&self, event_id: &str, event_type: &str) -> StoreResult<bool>;

    async fn complete(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> StoreResult<()>;

    async fn get(&self, event_id: &str) -> StoreResult<Option<WebhookEventRecord>>;

    /// Delete finished records created before `cutoff`; returns how many were removed
    async fn purge_older_than(&self, cutoff: OffsetDateTime) -> StoreResult<u64>;
}
