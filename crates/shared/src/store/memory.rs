use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderStore, TransitionOutcome, WebhookLedger, STUCK_PROCESSING_TIMEOUT_MINUTES};
use crate::error::{StoreError, StoreResult};
use crate::order::{NewOrder, Order, OrderStatus, PaymentOutcome, TransitionDecision};
use crate::webhook_event::{ProcessingResult, WebhookEventRecord};

/// A thread-safe in-memory store for orders and the webhook ledger.
///
/// Every conditional write runs under a single write lock, which gives the
/// same exactly-once transition guarantee as the PostgreSQL adapter. Used by
/// tests and local development.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    events: Arc<RwLock<HashMap<String, WebhookEventRecord>>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(id).cloned())
    }

    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        let order = order.into_order(OffsetDateTime::now_utc());
        orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        Ok(orders.remove(id).is_some())
    }

    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
        payment_id: Option<&str>,
    ) -> StoreResult<TransitionOutcome> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| StoreError::OrderNotFound(id.to_string()))?;

        match order.decide(outcome) {
            TransitionDecision::Apply => {
                order.apply_payment_outcome(outcome, payment_id, OffsetDateTime::now_utc());
                Ok(TransitionOutcome::Applied(order.clone()))
            }
            TransitionDecision::AlreadyApplied => Ok(TransitionOutcome::AlreadyApplied(order.clone())),
            TransitionDecision::Conflict => Ok(TransitionOutcome::Conflict(order.clone())),
        }
    }

    async fn expire_pending_checkouts(&self, cutoff: OffsetDateTime) -> StoreResult<Vec<String>> {
        let mut orders = self.orders.write().await;
        let now = OffsetDateTime::now_utc();
        let mut expired = Vec::new();

        for order in orders.values_mut() {
            if order.status == OrderStatus::PendingPayment && order.updated_at < cutoff {
                order.apply_payment_outcome(PaymentOutcome::Cancelled, None, now);
                expired.push(order.id.clone());
            }
        }

        Ok(expired)
    }
}

#[async_trait]
impl WebhookLedger for InMemoryStore {
    async fn claim(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        let mut events = self.events.write().await;
        let now = OffsetDateTime::now_utc();

        if let Some(record) = events.get_mut(event_id) {
            let stuck = record.processing_result == ProcessingResult::Processing
                && record.processing_started_at.is_some_and(|started| {
                    started < now - Duration::minutes(i64::from(STUCK_PROCESSING_TIMEOUT_MINUTES))
                });
            if record.processing_result != ProcessingResult::Error && !stuck {
                return Ok(false);
            }
            record.processing_result = ProcessingResult::Processing;
            record.processing_started_at = Some(now);
            record.error_message = None;
            record.updated_at = now;
            return Ok(true);
        }

        events.insert(
            event_id.to_string(),
            WebhookEventRecord {
                id: Uuid::new_v4(),
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                processing_result: ProcessingResult::Processing,
                processing_started_at: Some(now),
                error_message: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn complete(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let mut events = self.events.write().await;
        if let Some(record) = events.get_mut(event_id) {
            record.processing_result = result;
            record.error_message = error_message.map(str::to_string);
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<WebhookEventRecord>> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }

    async fn purge_older_than(&self, cutoff: OffsetDateTime) -> StoreResult<u64> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, record| {
            record.processing_result == ProcessingResult::Processing || record.created_at >= cutoff
        });
        Ok((before - events.len()) as u64)
    }
}
