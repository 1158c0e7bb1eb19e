// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Payment Webhooks
//!
//! Exercises a delivery end to end (verify, parse, finalize) for:
//! - Replay and tampering at the signature layer
//! - Redelivery and out-of-order outcomes at the finalizer
//! - Ledger recovery after failures

#[cfg(test)]
mod delivery_tests {
    use std::sync::Arc;

    use storefront_shared::{
        InMemoryStore, NewOrder, OrderItem, OrderStatus, OrderStore, PaymentStatus,
        ProcessingResult, WebhookLedger,
    };

    use crate::error::{PaymentError, PaymentResult};
    use crate::events::WebhookEvent;
    use crate::notifications::testing::RecordingNotifier;
    use crate::notifications::NotificationQueue;
    use crate::signature::WebhookVerifier;
    use crate::webhooks::{WebhookDisposition, WebhookHandler};

    const SECRET: &str = "whsec_c3RvcmVmcm9udC13ZWJob29rLXRlc3Qta2V5";
    const NOW: i64 = 1_700_000_000;

    struct Processor {
        store: InMemoryStore,
        verifier: WebhookVerifier,
        handler: WebhookHandler,
        notifier: Arc<RecordingNotifier>,
    }

    impl Processor {
        async fn new() -> Self {
            let store = InMemoryStore::new();
            let notifier = Arc::new(RecordingNotifier::default());
            let (queue, _sender) = NotificationQueue::start(notifier.clone(), 16);
            let handler =
                WebhookHandler::new(Arc::new(store.clone()), Arc::new(store.clone()), queue);

            store
                .create(NewOrder {
                    id: "ord_1".to_string(),
                    order_number: "SF-1001".to_string(),
                    status: OrderStatus::PendingPayment,
                    currency: "usd".to_string(),
                    shipping_cents: 0,
                    customer_name: "Ada Lovelace".to_string(),
                    customer_email: "ada@example.com".to_string(),
                    shipping: None,
                    items: vec![OrderItem {
                        product_name: "Notebook".to_string(),
                        quantity: 1,
                        unit_price_cents: 1500,
                    }],
                })
                .await
                .unwrap();

            Self {
                store,
                verifier: WebhookVerifier::new(SECRET, 180).unwrap(),
                handler,
                notifier,
            }
        }

        /// What the HTTP layer does with a delivery, minus the HTTP
        async fn deliver(
            &self,
            id: &str,
            timestamp: i64,
            signature: &str,
            body: &[u8],
        ) -> PaymentResult<WebhookDisposition> {
            let ts = timestamp.to_string();
            self.verifier.verify_at(id, &ts, signature, body, NOW)?;
            let event = WebhookEvent::from_slice(body)?;
            self.handler.handle_event(id, &event).await
        }

        fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> String {
            format!(
                "v1,{}",
                self.verifier
                    .sign(id, &timestamp.to_string(), body)
                    .unwrap()
            )
        }

        async fn order(&self) -> storefront_shared::Order {
            OrderStore::get(&self.store, "ord_1").await.unwrap().unwrap()
        }
    }

    fn body(event_type: &str, payment_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": event_type,
            "data": {
                "id": payment_id,
                "metadata": { "orderId": "ord_1", "orderNumber": "SF-1001" }
            }
        }))
        .unwrap()
    }

    // =========================================================================
    // Captured delivery replayed after the freshness window
    // =========================================================================
    #[tokio::test]
    async fn test_replay_outside_window_rejected_before_any_write() {
        let p = Processor::new().await;
        let payload = body("checkout.payment.succeeded", "pay_123");
        let sent_at = NOW - 600;
        let signature = p.sign("msg_1", sent_at, &payload);

        let err = p
            .deliver("msg_1", sent_at, &signature, &payload)
            .await
            .unwrap_err();
        assert!(err.is_authentication_failure());

        assert_eq!(p.order().await.status, OrderStatus::PendingPayment);
        assert!(WebhookLedger::get(&p.store, "msg_1")
            .await
            .unwrap()
            .is_none());
    }

    // =========================================================================
    // Body swapped under a valid signature
    // =========================================================================
    #[tokio::test]
    async fn test_swapped_body_rejected() {
        let p = Processor::new().await;
        let signed = body("checkout.payment.failed", "pay_123");
        let swapped = body("checkout.payment.succeeded", "pay_123");
        let signature = p.sign("msg_1", NOW, &signed);

        let err = p
            .deliver("msg_1", NOW, &signature, &swapped)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::WebhookSignatureInvalid));
        assert_eq!(p.order().await.payment_status, PaymentStatus::Pending);
    }

    // =========================================================================
    // Signed but unparseable body
    // =========================================================================
    #[tokio::test]
    async fn test_signed_garbage_is_malformed_not_processed() {
        let p = Processor::new().await;
        let payload = b"{\"type\":".to_vec();
        let signature = p.sign("msg_1", NOW, &payload);

        let err = p
            .deliver("msg_1", NOW, &signature, &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedPayload(_)));
        assert!(WebhookLedger::get(&p.store, "msg_1")
            .await
            .unwrap()
            .is_none());
    }

    // =========================================================================
    // Failure arrives after success (out-of-order delivery)
    // =========================================================================
    #[tokio::test]
    async fn test_late_failure_never_cancels_paid_order() {
        let p = Processor::new().await;

        let success = body("checkout.payment.succeeded", "pay_123");
        let sig = p.sign("msg_1", NOW, &success);
        p.deliver("msg_1", NOW, &sig, &success).await.unwrap();

        let failure = body("checkout.payment.failed", "pay_122");
        let sig = p.sign("msg_0", NOW, &failure);
        let disposition = p.deliver("msg_0", NOW, &sig, &failure).await.unwrap();
        assert!(matches!(disposition, WebhookDisposition::Conflict { .. }));

        let order = p.order().await;
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_id.as_deref(), Some("pay_123"));

        let record = WebhookLedger::get(&p.store, "msg_0").await.unwrap().unwrap();
        assert_eq!(record.processing_result, ProcessingResult::Skipped);
    }

    // =========================================================================
    // Same delivery retried by the processor after a lost response
    // =========================================================================
    #[tokio::test]
    async fn test_retried_delivery_is_acknowledged_without_side_effects() {
        let p = Processor::new().await;
        let payload = body("checkout.payment.succeeded", "pay_123");
        let sig = p.sign("msg_1", NOW, &payload);

        p.deliver("msg_1", NOW, &sig, &payload).await.unwrap();
        let before = p.order().await;

        for _ in 0..3 {
            let disposition = p.deliver("msg_1", NOW, &sig, &payload).await.unwrap();
            assert_eq!(disposition, WebhookDisposition::Duplicate);
        }
        assert_eq!(p.order().await, before);

        // Give the background sender a moment to drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(p.notifier.sent.lock().await.len(), 1);
    }

    // =========================================================================
    // Stuck claim from a crashed worker
    // =========================================================================
    #[tokio::test]
    async fn test_in_flight_event_is_not_processed_twice() {
        let p = Processor::new().await;
        let payload = body("checkout.payment.succeeded", "pay_123");
        let sig = p.sign("msg_1", NOW, &payload);

        // Another worker holds the claim
        assert!(p
            .store
            .claim("msg_1", "checkout.payment.succeeded")
            .await
            .unwrap());

        let disposition = p.deliver("msg_1", NOW, &sig, &payload).await.unwrap();
        assert_eq!(disposition, WebhookDisposition::Duplicate);
        assert_eq!(p.order().await.status, OrderStatus::PendingPayment);
    }
}
