use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{OrderStore, TransitionOutcome, WebhookLedger, STUCK_PROCESSING_TIMEOUT_MINUTES};
use crate::error::{StoreError, StoreResult};
use crate::order::{
    NewOrder, Order, OrderItem, OrderStatus, PaymentOutcome, ShippingAddress, TransitionDecision,
};
use crate::webhook_event::{ProcessingResult, WebhookEventRecord};

const ORDER_COLUMNS: &str = r#"
    id, order_number, status, payment_status, payment_id, currency,
    subtotal_cents, shipping_cents, total_cents, customer_name, customer_email,
    shipping_address, created_at, updated_at
"#;

/// Database row for the `orders` table
#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    status: String,
    payment_status: String,
    payment_id: Option<String>,
    currency: String,
    subtotal_cents: i64,
    shipping_cents: i64,
    total_cents: i64,
    customer_name: String,
    customer_email: String,
    shipping_address: Option<Json<ShippingAddress>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StoreResult<Order> {
        Ok(Order {
            status: self.status.parse()?,
            payment_status: self.payment_status.parse()?,
            id: self.id,
            order_number: self.order_number,
            payment_id: self.payment_id,
            currency: self.currency,
            subtotal_cents: self.subtotal_cents,
            shipping_cents: self.shipping_cents,
            total_cents: self.total_cents,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            shipping: self.shipping_address.map(|json| json.0),
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    product_name: String,
    quantity: i32,
    unit_price_cents: i64,
}

#[derive(Debug, FromRow)]
struct WebhookEventRow {
    id: Uuid,
    event_id: String,
    event_type: String,
    processing_result: String,
    processing_started_at: Option<OffsetDateTime>,
    error_message: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

/// PostgreSQL-backed order store and webhook ledger
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &str) -> StoreResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT product_name, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OrderItem {
                product_name: row.product_name,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
            })
            .collect())
    }

    async fn hydrate(&self, row: OrderRow) -> StoreResult<Order> {
        let items = self.load_items(&row.id).await?;
        row.into_order(items)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, order: NewOrder) -> StoreResult<Order> {
        let order_id = order.id.clone();
        let order = order.into_order(OffsetDateTime::now_utc());

        // Order row and its items are created atomically
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, status, payment_status, currency,
                subtotal_cents, shipping_cents, total_cents,
                customer_name, customer_email, shipping_address,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.currency)
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(order.shipping.clone().map(Json))
        .bind(order.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                return Err(StoreError::DuplicateOrder(order_id));
            }
            return Err(e.into());
        }

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_name, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&order.id)
            .bind(position as i32)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(order_id = %order.id, "Order created");
        Ok(order)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
        payment_id: Option<&str>,
    ) -> StoreResult<TransitionOutcome> {
        // Single conditional write: only an order still awaiting payment moves.
        // Concurrent deliveries race on the row lock and at most one sees RETURNING.
        let updated: Option<OrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE orders
            SET status = $2,
                payment_status = $3,
                payment_id = COALESCE($4, payment_id),
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('pending', 'pending_payment')
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(outcome.order_status().as_str())
        .bind(outcome.payment_status().as_str())
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(TransitionOutcome::Applied(self.hydrate(row).await?));
        }

        let current = OrderStore::get(self, id)
            .await?
            .ok_or_else(|| StoreError::OrderNotFound(id.to_string()))?;

        match current.decide(outcome) {
            TransitionDecision::AlreadyApplied => Ok(TransitionOutcome::AlreadyApplied(current)),
            TransitionDecision::Conflict => Ok(TransitionOutcome::Conflict(current)),
            TransitionDecision::Apply => {
                // Only reachable if the order was moved back into the payment
                // window between the UPDATE and the SELECT
                tracing::warn!(
                    order_id = %id,
                    status = %current.status,
                    "Order re-entered payment window during transition"
                );
                Ok(TransitionOutcome::Conflict(current))
            }
        }
    }

    async fn expire_pending_checkouts(&self, cutoff: OffsetDateTime) -> StoreResult<Vec<String>> {
        let expired: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $1,
                payment_status = $2,
                updated_at = NOW()
            WHERE status = 'pending_payment'
              AND updated_at < $3
            RETURNING id
            "#,
        )
        .bind(OrderStatus::Cancelled.as_str())
        .bind(PaymentOutcome::Cancelled.payment_status().as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(expired.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl WebhookLedger for PgStore {
    async fn claim(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        // INSERT...ON CONFLICT...RETURNING gives exactly one concurrent caller the claim.
        // Events that failed, or that have been stuck in processing past the
        // timeout, may be claimed again.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_webhook_events
                (id, event_id, event_type, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = NULL,
                updated_at = NOW()
            WHERE payment_webhook_events.processing_result = 'error'
               OR (payment_webhook_events.processing_result = 'processing'
                   AND payment_webhook_events.processing_started_at < NOW() - make_interval(mins => $4))
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(event_type)
        .bind(STUCK_PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn complete(
        &self,
        event_id: &str,
        result: ProcessingResult,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_webhook_events
            SET processing_result = $1, error_message = $2, updated_at = NOW()
            WHERE event_id = $3
            "#,
        )
        .bind(result.as_str())
        .bind(error_message)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<WebhookEventRecord>> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, processing_result, processing_started_at,
                   error_message, created_at, updated_at
            FROM payment_webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> StoreResult<WebhookEventRecord> {
            Ok(WebhookEventRecord {
                processing_result: row.processing_result.parse()?,
                id: row.id,
                event_id: row.event_id,
                event_type: row.event_type,
                processing_started_at: row.processing_started_at,
                error_message: row.error_message,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .transpose()
    }

    async fn purge_older_than(&self, cutoff: OffsetDateTime) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM payment_webhook_events
            WHERE created_at < $1
              AND processing_result <> 'processing'
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// Run with `DATABASE_URL=postgres://... cargo test -p storefront-shared -- --ignored`.
// Each test gets a fresh database with the embedded migrations applied.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PaymentStatus;

    fn new_order(id: &str, status: OrderStatus) -> NewOrder {
        NewOrder {
            id: id.to_string(),
            order_number: format!("SF-{}", id),
            status,
            currency: "usd".to_string(),
            shipping_cents: 500,
            customer_name: "Ada Lovelace".to_string(),
            customer_email: "ada@example.com".to_string(),
            shipping: Some(ShippingAddress {
                recipient: "Ada Lovelace".to_string(),
                line1: "12 St James's Square".to_string(),
                line2: None,
                city: "London".to_string(),
                postal_code: "SW1Y 4JH".to_string(),
                country: "GB".to_string(),
            }),
            items: vec![
                OrderItem {
                    product_name: "Notebook".to_string(),
                    quantity: 2,
                    unit_price_cents: 1250,
                },
                OrderItem {
                    product_name: "Pen".to_string(),
                    quantity: 1,
                    unit_price_cents: 300,
                },
            ],
        }
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_create_and_get_round_trip(pool: PgPool) {
        let store = PgStore::new(pool);
        let created = store
            .create(new_order("ord_1", OrderStatus::PendingPayment))
            .await
            .unwrap();

        let loaded = OrderStore::get(&store, "ord_1").await.unwrap().unwrap();
        assert_eq!(loaded.total_cents, 3300);
        assert_eq!(loaded.items, created.items);
        assert_eq!(loaded.shipping, created.shipping);

        assert!(matches!(
            store.create(new_order("ord_1", OrderStatus::Pending)).await,
            Err(StoreError::DuplicateOrder(id)) if id == "ord_1"
        ));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_transition_applied_then_already_applied(pool: PgPool) {
        let store = PgStore::new(pool);
        store
            .create(new_order("ord_1", OrderStatus::PendingPayment))
            .await
            .unwrap();

        let first = store
            .apply_payment_outcome("ord_1", PaymentOutcome::Succeeded, Some("pay_123"))
            .await
            .unwrap();
        let TransitionOutcome::Applied(order) = first else {
            panic!("expected Applied, got {:?}", first);
        };
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_id.as_deref(), Some("pay_123"));
        assert_eq!(order.items.len(), 2);

        let second = store
            .apply_payment_outcome("ord_1", PaymentOutcome::Succeeded, Some("pay_999"))
            .await
            .unwrap();
        assert!(matches!(second, TransitionOutcome::AlreadyApplied(_)));

        let stored = OrderStore::get(&store, "ord_1").await.unwrap().unwrap();
        assert_eq!(stored.payment_id.as_deref(), Some("pay_123"));
        assert_eq!(stored.updated_at, order.updated_at);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_success_on_cancelled_order_conflicts(pool: PgPool) {
        let store = PgStore::new(pool);
        store
            .create(new_order("ord_1", OrderStatus::PendingPayment))
            .await
            .unwrap();
        store
            .apply_payment_outcome("ord_1", PaymentOutcome::Cancelled, None)
            .await
            .unwrap();

        let outcome = store
            .apply_payment_outcome("ord_1", PaymentOutcome::Succeeded, Some("pay_123"))
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Conflict(_)));

        let stored = OrderStore::get(&store, "ord_1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.payment_status, PaymentStatus::Cancelled);
        assert!(stored.payment_id.is_none());
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_transition_unknown_order(pool: PgPool) {
        let store = PgStore::new(pool);
        let err = store
            .apply_payment_outcome("ord_missing", PaymentOutcome::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(id) if id == "ord_missing"));
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_transitions_apply_exactly_once(pool: PgPool) {
        let store = PgStore::new(pool);
        store
            .create(new_order("ord_1", OrderStatus::PendingPayment))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            // Mix outcomes: whichever commits first wins, the rest must not write
            let outcome = if i % 2 == 0 {
                PaymentOutcome::Succeeded
            } else {
                PaymentOutcome::Failed
            };
            handles.push(tokio::spawn(async move {
                store
                    .apply_payment_outcome("ord_1", outcome, Some("pay_123"))
                    .await
                    .unwrap()
            }));
        }

        let mut applied = Vec::new();
        for handle in handles {
            if let TransitionOutcome::Applied(order) = handle.await.unwrap() {
                applied.push(order);
            }
        }
        assert_eq!(applied.len(), 1);

        let stored = OrderStore::get(&store, "ord_1").await.unwrap().unwrap();
        assert_eq!(stored.status, applied[0].status);
        assert_eq!(stored.payment_status, applied[0].payment_status);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_expire_only_touches_stale_checkouts(pool: PgPool) {
        let store = PgStore::new(pool);
        store
            .create(new_order("ord_stale", OrderStatus::PendingPayment))
            .await
            .unwrap();
        store
            .create(new_order("ord_draft", OrderStatus::Pending))
            .await
            .unwrap();

        let expired = store
            .expire_pending_checkouts(OffsetDateTime::now_utc() + time::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(expired, vec!["ord_stale".to_string()]);

        let draft = OrderStore::get(&store, "ord_draft").await.unwrap().unwrap();
        assert_eq!(draft.status, OrderStatus::Pending);
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_claim_is_exclusive_until_error(pool: PgPool) {
        let store = PgStore::new(pool);
        assert!(store.claim("evt_1", "checkout.payment.failed").await.unwrap());
        assert!(!store.claim("evt_1", "checkout.payment.failed").await.unwrap());

        store
            .complete("evt_1", ProcessingResult::Success, None)
            .await
            .unwrap();
        assert!(!store.claim("evt_1", "checkout.payment.failed").await.unwrap());

        assert!(store.claim("evt_2", "checkout.payment.failed").await.unwrap());
        store
            .complete("evt_2", ProcessingResult::Error, Some("Order not found: ord_9"))
            .await
            .unwrap();
        assert!(store.claim("evt_2", "checkout.payment.failed").await.unwrap());

        let record = WebhookLedger::get(&store, "evt_2").await.unwrap().unwrap();
        assert_eq!(record.processing_result, ProcessingResult::Processing);
        assert!(record.error_message.is_none());
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_stuck_claim_can_be_taken_over(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        assert!(store.claim("evt_1", "checkout.payment.succeeded").await.unwrap());
        assert!(!store.claim("evt_1", "checkout.payment.succeeded").await.unwrap());

        // Simulate a worker that crashed mid-processing past the timeout
        sqlx::query(
            r#"
            UPDATE payment_webhook_events
            SET processing_started_at = NOW() - make_interval(mins => $1 + 1)
            WHERE event_id = $2
            "#,
        )
        .bind(STUCK_PROCESSING_TIMEOUT_MINUTES)
        .bind("evt_1")
        .execute(&pool)
        .await
        .unwrap();

        assert!(store.claim("evt_1", "checkout.payment.succeeded").await.unwrap());
        assert!(!store.claim("evt_1", "checkout.payment.succeeded").await.unwrap());
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_claims_have_one_winner(pool: PgPool) {
        let store = PgStore::new(pool);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim("evt_1", "checkout.payment.succeeded")
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
