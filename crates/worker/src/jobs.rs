//! Scheduled maintenance jobs

use storefront_shared::{OrderStore, StoreResult, WebhookLedger};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Cancel checkouts that have waited on payment longer than `max_age`.
///
/// Uses the same conditional transition as payment events, so an order paid
/// while this job runs stays paid.
pub async fn expire_abandoned_checkouts(
    orders: &dyn OrderStore,
    max_age: Duration,
    now: OffsetDateTime,
) -> StoreResult<usize> {
    let cutoff = now - max_age;
    let expired = orders.expire_pending_checkouts(cutoff).await?;

    if expired.is_empty() {
        info!("No abandoned checkouts to expire");
    } else {
        for order_id in &expired {
            info!(order_id = %order_id, "Expired abandoned checkout");
        }
        warn!(
            count = expired.len(),
            cutoff = %cutoff,
            "Abandoned checkouts cancelled"
        );
    }

    Ok(expired.len())
}

/// Remove finished ledger entries older than the retention window
pub async fn purge_webhook_ledger(
    ledger: &dyn WebhookLedger,
    retention: Duration,
    now: OffsetDateTime,
) -> StoreResult<u64> {
    let purged = ledger.purge_older_than(now - retention).await?;
    info!(purged = purged, "Webhook ledger cleanup complete");
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_shared::{
        InMemoryStore, NewOrder, OrderItem, OrderStatus, PaymentOutcome, ProcessingResult,
    };

    async fn checkout(store: &InMemoryStore, id: &str) {
        store
            .create(NewOrder {
                id: id.to_string(),
                order_number: format!("SF-{}", id),
                status: OrderStatus::PendingPayment,
                currency: "usd".to_string(),
                shipping_cents: 0,
                customer_name: "Ada".to_string(),
                customer_email: "ada@example.com".to_string(),
                shipping: None,
                items: vec![OrderItem {
                    product_name: "Notebook".to_string(),
                    quantity: 1,
                    unit_price_cents: 1000,
                }],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expiry_skips_recent_and_paid_orders() {
        let store = InMemoryStore::new();
        checkout(&store, "ord_old").await;
        checkout(&store, "ord_paid").await;
        store
            .apply_payment_outcome("ord_paid", PaymentOutcome::Succeeded, Some("pay_1"))
            .await
            .unwrap();

        // Orders were just created: a 24h window expires nothing
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            expire_abandoned_checkouts(&store, Duration::hours(24), now)
                .await
                .unwrap(),
            0
        );

        // A day later the unpaid checkout is abandoned
        let later = now + Duration::hours(25);
        assert_eq!(
            expire_abandoned_checkouts(&store, Duration::hours(24), later)
                .await
                .unwrap(),
            1
        );

        let old = OrderStore::get(&store, "ord_old").await.unwrap().unwrap();
        assert_eq!(old.status, OrderStatus::Cancelled);
        let paid = OrderStore::get(&store, "ord_paid").await.unwrap().unwrap();
        assert_eq!(paid.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_ledger_purge_respects_retention() {
        let store = InMemoryStore::new();
        store.claim("evt_1", "checkout.payment.succeeded").await.unwrap();
        store
            .complete("evt_1", ProcessingResult::Success, None)
            .await
            .unwrap();

        let now = OffsetDateTime::now_utc();
        assert_eq!(
            purge_webhook_ledger(&store, Duration::days(7), now)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            purge_webhook_ledger(&store, Duration::days(7), now + Duration::days(8))
                .await
                .unwrap(),
            1
        );
    }
}
