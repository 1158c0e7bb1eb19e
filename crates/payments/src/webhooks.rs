//! Payment webhook handling
//!
//! Applies verified payment events to orders: claims the event in the webhook
//! ledger, moves the referenced order with a single conditional write, and
//! queues the confirmation email for newly paid orders.

use std::sync::Arc;

use storefront_shared::{
    OrderStore, PaymentOutcome, ProcessingResult, TransitionOutcome, WebhookLedger,
};

use crate::email::OrderConfirmation;
use crate::error::{PaymentError, PaymentResult};
use crate::events::WebhookEvent;
use crate::notifications::NotificationQueue;

/// What handling a webhook event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// The order moved to the outcome's target state
    Applied {
        order_id: String,
        outcome: PaymentOutcome,
    },
    /// The order already reflected this outcome
    AlreadyApplied { order_id: String },
    /// The order had already left the payment window with another result
    Conflict { order_id: String },
    /// Event id already processed, or being processed by another request
    Duplicate,
    /// Event type this service does not act on
    Ignored,
    /// Recognized event without an order reference; dropped
    MissingOrderReference,
}

impl WebhookDisposition {
    fn ledger_result(&self) -> ProcessingResult {
        match self {
            Self::Applied { .. } | Self::AlreadyApplied { .. } => ProcessingResult::Success,
            _ => ProcessingResult::Skipped,
        }
    }
}

/// Webhook handler for payment events
pub struct WebhookHandler {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn WebhookLedger>,
    notifications: NotificationQueue,
}

impl WebhookHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn WebhookLedger>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            orders,
            ledger,
            notifications,
        }
    }

    /// Handle a verified payment event
    ///
    /// Claims the event id in the ledger first so concurrent or repeated
    /// deliveries of one event are processed once. Errors (unknown order,
    /// storage failure) are recorded on the ledger entry, which lets the
    /// processor's redelivery claim the event again.
    pub async fn handle_event(
        &self,
        event_id: &str,
        event: &WebhookEvent,
    ) -> PaymentResult<WebhookDisposition> {
        let claimed = self.ledger.claim(event_id, &event.event_type).await.map_err(|e| {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            PaymentError::from(e)
        })?;

        if !claimed {
            let existing = self.ledger.get(event_id).await.ok().flatten();
            let reason = match existing.map(|record| record.processing_result) {
                Some(ProcessingResult::Success) => "already processed successfully",
                Some(ProcessingResult::Skipped) => "already accepted without action",
                Some(ProcessingResult::Processing) => "currently being processed by another request",
                Some(ProcessingResult::Error) => "previous attempt failed",
                None => "unknown (race condition?)",
            };
            tracing::info!(
                event_id = %event_id,
                event_type = %event.event_type,
                reason = %reason,
                "Duplicate webhook event"
            );
            return Ok(WebhookDisposition::Duplicate);
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event.event_type,
            "Processing payment webhook event"
        );

        let result = self.process_event_internal(event_id, event).await;

        let (processing_result, error_message) = match &result {
            Ok(disposition) => (disposition.ledger_result(), None),
            Err(e) => (ProcessingResult::Error, Some(e.to_string())),
        };

        // Retry once - the ledger entry is what makes redelivery safe
        if let Err(e) = self
            .ledger
            .complete(event_id, processing_result, error_message.as_deref())
            .await
        {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "First attempt to update webhook ledger failed, retrying..."
            );
            if let Err(retry_err) = self
                .ledger
                .complete(event_id, processing_result, error_message.as_deref())
                .await
            {
                tracing::error!(
                    event_id = %event_id,
                    processing_result = %processing_result,
                    first_error = %e,
                    retry_error = %retry_err,
                    "Failed to update webhook ledger after retry. \
                     Event stays in 'processing' until the claim times out."
                );
            }
        }

        result
    }

    async fn process_event_internal(
        &self,
        event_id: &str,
        event: &WebhookEvent,
    ) -> PaymentResult<WebhookDisposition> {
        let Some(outcome) = event.outcome() else {
            tracing::info!(
                event_id = %event_id,
                event_type = %event.event_type,
                "Received unhandled payment event type - ignoring"
            );
            return Ok(WebhookDisposition::Ignored);
        };

        let Some(order_id) = event.order_id() else {
            tracing::error!(
                event_id = %event_id,
                event_type = %event.event_type,
                "Payment event has no orderId in metadata - dropping"
            );
            return Ok(WebhookDisposition::MissingOrderReference);
        };

        // Only a successful payment carries an identifier worth keeping
        let payment_id = match outcome {
            PaymentOutcome::Succeeded => event.payment_id(),
            PaymentOutcome::Failed | PaymentOutcome::Cancelled => None,
        };
        if outcome == PaymentOutcome::Succeeded && payment_id.is_none() {
            tracing::warn!(
                event_id = %event_id,
                order_id = %order_id,
                "Succeeded payment event has no payment id - order will be confirmed without one"
            );
        }

        let transition = self
            .orders
            .apply_payment_outcome(order_id, outcome, payment_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    event_id = %event_id,
                    order_id = %order_id,
                    outcome = %outcome,
                    error = %e,
                    "Unprocessable payment event"
                );
                PaymentError::from(e)
            })?;

        if let Some(expected) = event.data.metadata.order_number.as_deref() {
            let actual = &transition.order().order_number;
            if expected != actual {
                tracing::warn!(
                    order_id = %order_id,
                    metadata_order_number = %expected,
                    order_number = %actual,
                    "Payment metadata order number does not match order"
                );
            }
        }

        match transition {
            TransitionOutcome::Applied(order) => {
                tracing::info!(
                    event_id = %event_id,
                    order_id = %order.id,
                    order_number = %order.order_number,
                    status = %order.status,
                    payment_status = %order.payment_status,
                    payment_id = ?order.payment_id,
                    "Order payment transition applied"
                );

                if outcome == PaymentOutcome::Succeeded {
                    self.notifications
                        .enqueue(OrderConfirmation::from_order(&order));
                }

                Ok(WebhookDisposition::Applied {
                    order_id: order.id,
                    outcome,
                })
            }
            TransitionOutcome::AlreadyApplied(order) => {
                tracing::info!(
                    event_id = %event_id,
                    order_id = %order.id,
                    payment_status = %order.payment_status,
                    "Order already reflects payment outcome - no-op"
                );
                Ok(WebhookDisposition::AlreadyApplied { order_id: order.id })
            }
            TransitionOutcome::Conflict(order) => {
                if outcome == PaymentOutcome::Succeeded {
                    tracing::error!(
                        event_id = %event_id,
                        order_id = %order.id,
                        status = %order.status,
                        payment_status = %order.payment_status,
                        payment_id = ?event.payment_id(),
                        "Payment succeeded for an order no longer awaiting payment - manual refund required"
                    );
                } else {
                    tracing::warn!(
                        event_id = %event_id,
                        order_id = %order.id,
                        outcome = %outcome,
                        status = %order.status,
                        payment_status = %order.payment_status,
                        "Payment event conflicts with order state - ignoring"
                    );
                }
                Ok(WebhookDisposition::Conflict { order_id: order.id })
            }
        }
    }
}
