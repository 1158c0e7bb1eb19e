//! Best-effort notification dispatch
//!
//! Confirmed orders enqueue a confirmation on a bounded channel drained by a
//! background task. Sending never blocks the webhook response and a failed
//! send never affects the order transition: errors are retried with backoff,
//! then logged and discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::email::{OrderConfirmation, OrderNotifier};

/// Default number of queued confirmations before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Retries after the first failed send
const MAX_SEND_RETRIES: usize = 3;

/// Handle for enqueueing confirmations; cheap to clone
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<OrderConfirmation>,
}

impl NotificationQueue {
    /// Start the background sender.
    ///
    /// The task exits once every queue handle has been dropped and the
    /// remaining confirmations have been attempted.
    pub fn start(notifier: Arc<dyn OrderNotifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_sender(rx, notifier));
        (Self { tx }, handle)
    }

    /// Enqueue without waiting; returns `false` if the confirmation was dropped
    pub fn enqueue(&self, confirmation: OrderConfirmation) -> bool {
        match self.tx.try_send(confirmation) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(confirmation)) => {
                tracing::warn!(
                    order_id = %confirmation.order_id,
                    "Notification queue full - dropping order confirmation"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(confirmation)) => {
                tracing::error!(
                    order_id = %confirmation.order_id,
                    "Notification sender stopped - dropping order confirmation"
                );
                false
            }
        }
    }
}

async fn run_sender(mut rx: mpsc::Receiver<OrderConfirmation>, notifier: Arc<dyn OrderNotifier>) {
    while let Some(confirmation) = rx.recv().await {
        deliver(notifier.clone(), confirmation).await;
    }
    tracing::debug!("Notification queue closed");
}

async fn deliver(notifier: Arc<dyn OrderNotifier>, confirmation: OrderConfirmation) {
    // 200ms, 400ms, 800ms (jittered)
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(100)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(MAX_SEND_RETRIES);

    let result = Retry::spawn(strategy, || {
        let notifier = notifier.clone();
        let confirmation = confirmation.clone();
        async move {
            let result = notifier.send_order_confirmation(&confirmation).await;
            if let Err(e) = &result {
                tracing::warn!(
                    order_id = %confirmation.order_id,
                    error = %e,
                    "Order confirmation send failed"
                );
            }
            result
        }
    })
    .await;

    if let Err(e) = result {
        tracing::error!(
            order_id = %confirmation.order_id,
            order_number = %confirmation.order_number,
            error = %e,
            "Giving up on order confirmation email"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::{PaymentError, PaymentResult};

    /// Notifier that records confirmations and can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<OrderConfirmation>>,
        pub attempts: AtomicUsize,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderNotifier for RecordingNotifier {
        async fn send_order_confirmation(
            &self,
            confirmation: &OrderConfirmation,
        ) -> PaymentResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PaymentError::Email("provider unavailable".to_string()));
            }
            self.sent.lock().await.push(confirmation.clone());
            Ok(())
        }
    }
}
