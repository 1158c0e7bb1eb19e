//! Storefront order model
//!
//! Payment events move an order along a small state machine:
//!
//! ```text
//! pending ──> pending_payment ──┬──> confirmed ──> shipped ──> delivered
//!                               └──> cancelled
//! ```
//!
//! Only `pending` and `pending_payment` orders accept a payment outcome. The
//! refund path (`refunded`) is driven by admin tooling, not by payment events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StoreError;

/// Fulfilment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PendingPayment,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPayment => "pending_payment",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Whether a payment outcome may still be applied to an order in this status
    pub fn accepts_payment_outcome(&self) -> bool {
        matches!(self, Self::Pending | Self::PendingPayment)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_payment" => Ok(Self::PendingPayment),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(StoreError::Corrupt(format!("unknown order status '{}'", other))),
        }
    }
}

/// Payment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StoreError::Corrupt(format!(
                "unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Terminal result of a payment attempt, as reported by the payment processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentOutcome {
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            Self::Succeeded => PaymentStatus::Paid,
            Self::Failed => PaymentStatus::Failed,
            Self::Cancelled => PaymentStatus::Cancelled,
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            Self::Succeeded => OrderStatus::Confirmed,
            Self::Failed | Self::Cancelled => OrderStatus::Cancelled,
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What applying a payment outcome to an order would do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// The order is awaiting payment and moves to the outcome's target state
    Apply,
    /// The order already carries the outcome's payment status
    AlreadyApplied,
    /// The order has left the payment window with a different result
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl OrderItem {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// A storefront order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Payment processor identifier, recorded once the payment succeeds
    pub payment_id: Option<String>,
    pub currency: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping: Option<ShippingAddress>,
    pub items: Vec<OrderItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Order {
    /// Decide how a payment outcome applies to this order in its current state
    pub fn decide(&self, outcome: PaymentOutcome) -> TransitionDecision {
        if self.status.accepts_payment_outcome() {
            TransitionDecision::Apply
        } else if self.payment_status == outcome.payment_status() {
            TransitionDecision::AlreadyApplied
        } else {
            TransitionDecision::Conflict
        }
    }

    /// Move the order to the outcome's target state.
    ///
    /// Callers must have checked [`Order::decide`] first; the storage adapters
    /// do this inside the same conditional write.
    pub fn apply_payment_outcome(
        &mut self,
        outcome: PaymentOutcome,
        payment_id: Option<&str>,
        now: OffsetDateTime,
    ) {
        self.status = outcome.order_status();
        self.payment_status = outcome.payment_status();
        if let Some(payment_id) = payment_id {
            self.payment_id = Some(payment_id.to_string());
        }
        self.updated_at = now;
    }
}

/// Order as submitted at checkout, before the store stamps it
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub currency: String,
    pub shipping_cents: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping: Option<ShippingAddress>,
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(OrderItem::line_total_cents).sum()
    }

    pub fn total_cents(&self) -> i64 {
        self.subtotal_cents() + self.shipping_cents
    }

    pub fn into_order(self, now: OffsetDateTime) -> Order {
        let subtotal_cents = self.subtotal_cents();
        let total_cents = self.total_cents();
        Order {
            id: self.id,
            order_number: self.order_number,
            status: self.status,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            currency: self.currency,
            subtotal_cents,
            shipping_cents: self.shipping_cents,
            total_cents,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            shipping: self.shipping,
            items: self.items,
            created_at: now,
            updated_at: now,
        }
    }
}
