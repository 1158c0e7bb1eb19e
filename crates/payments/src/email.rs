//! Order confirmation emails
//!
//! Sends transactional email through the Resend HTTP API. Without an API key
//! the service runs disabled: it logs what it would have sent and succeeds.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use storefront_shared::{Order, OrderItem, ShippingAddress};

use crate::error::{PaymentError, PaymentResult};

const DEFAULT_API_BASE: &str = "https://api.resend.com";

/// Everything the confirmation email needs, captured when the order was confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub currency: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping: Option<ShippingAddress>,
    pub payment_id: Option<String>,
}

impl OrderConfirmation {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            currency: order.currency.clone(),
            items: order.items.clone(),
            subtotal_cents: order.subtotal_cents,
            shipping_cents: order.shipping_cents,
            total_cents: order.total_cents,
            shipping: order.shipping.clone(),
            payment_id: order.payment_id.clone(),
        }
    }
}

/// Sends order notifications to customers
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn send_order_confirmation(&self, confirmation: &OrderConfirmation) -> PaymentResult<()>;
}

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; `None` disables sending
    pub api_key: Option<String>,
    pub from: String,
    pub store_name: String,
    pub api_base: String,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source (the process environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup("RESEND_API_KEY").filter(|key| !key.trim().is_empty()),
            from: lookup("EMAIL_FROM").unwrap_or_else(|| "orders@localhost".to_string()),
            store_name: lookup("STORE_NAME").unwrap_or_else(|| "Storefront".to_string()),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// A rendered email ready to hand to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Email service for order notifications
#[derive(Clone)]
pub struct OrderEmailService {
    http: Client,
    config: EmailConfig,
}

impl OrderEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn render_confirmation(&self, confirmation: &OrderConfirmation) -> RenderedEmail {
        let currency = confirmation.currency.as_str();
        let subject = format!(
            "{}: order {} confirmed",
            self.config.store_name, confirmation.order_number
        );

        let rows: String = confirmation
            .items
            .iter()
            .map(|item| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(&item.product_name),
                    item.quantity,
                    format_money(item.line_total_cents(), currency)
                )
            })
            .collect();

        let shipping_block = match &confirmation.shipping {
            Some(address) => {
                let mut lines = vec![escape_html(&address.recipient), escape_html(&address.line1)];
                if let Some(line2) = &address.line2 {
                    lines.push(escape_html(line2));
                }
                lines.push(format!(
                    "{} {}",
                    escape_html(&address.postal_code),
                    escape_html(&address.city)
                ));
                lines.push(escape_html(&address.country));
                format!("<h3>Shipping to</h3><p>{}</p>", lines.join("<br>"))
            }
            None => String::new(),
        };

        let html = format!(
            "<p>Hi {name},</p>\
             <p>Thanks for your order! Your payment was received and order <strong>{number}</strong> is confirmed.</p>\
             <table><thead><tr><th>Item</th><th>Qty</th><th>Total</th></tr></thead><tbody>{rows}</tbody></table>\
             <p>Subtotal: {subtotal}<br>Shipping: {shipping}<br><strong>Total: {total}</strong></p>\
             {shipping_block}\
             <p>{store}</p>",
            name = escape_html(&confirmation.customer_name),
            number = escape_html(&confirmation.order_number),
            rows = rows,
            subtotal = format_money(confirmation.subtotal_cents, currency),
            shipping = format_money(confirmation.shipping_cents, currency),
            total = format_money(confirmation.total_cents, currency),
            shipping_block = shipping_block,
            store = escape_html(&self.config.store_name),
        );

        RenderedEmail { subject, html }
    }

    async fn send_email(&self, api_key: &str, to: &str, email: &RenderedEmail) -> PaymentResult<()> {
        let response = self
            .http
            .post(format!("{}/emails", self.config.api_base))
            .bearer_auth(api_key)
            .json(&SendEmailRequest {
                from: &self.config.from,
                to: [to],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Email(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl OrderNotifier for OrderEmailService {
    async fn send_order_confirmation(&self, confirmation: &OrderConfirmation) -> PaymentResult<()> {
        let email = self.render_confirmation(confirmation);

        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::info!(
                order_id = %confirmation.order_id,
                to = %confirmation.customer_email,
                subject = %email.subject,
                "Email disabled - skipping order confirmation"
            );
            return Ok(());
        };

        self.send_email(api_key, &confirmation.customer_email, &email)
            .await?;

        tracing::info!(
            order_id = %confirmation.order_id,
            to = %confirmation.customer_email,
            "Order confirmation email sent"
        );
        Ok(())
    }
}

/// Format minor units as `12.50 USD`
pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        abs / 100,
        abs % 100,
        currency.to_uppercase()
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
