//! Webhook signature verification
//!
//! The payment processor signs `<webhook-id>.<webhook-timestamp>.<raw body>`
//! with HMAC-SHA256, keyed by the base64 part of a `whsec_` secret, and sends
//! the base64 digest in `webhook-signature` as space-separated
//! `version,signature` tokens. Every `v1` token is checked so that a secret
//! rotation (two signatures on one delivery) verifies against either key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::error::{PaymentError, PaymentResult};

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by processor-issued webhook secrets
pub const SECRET_PREFIX: &str = "whsec_";

/// Default freshness window (3 minutes)
pub const DEFAULT_TOLERANCE_SECS: i64 = 180;

const SIGNATURE_VERSION: &str = "v1";

/// Verifies authenticity and freshness of inbound payment webhooks
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("key", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_<base64>` secret.
    ///
    /// The secret is decoded once here; a malformed secret is a configuration
    /// error, not a per-request failure.
    pub fn new(secret: &str, tolerance_secs: i64) -> PaymentResult<Self> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| PaymentError::InvalidSecret(format!("not valid base64: {}", e)))?;

        if key.is_empty() {
            return Err(PaymentError::InvalidSecret("empty key".to_string()));
        }

        Ok(Self {
            key,
            tolerance_secs: tolerance_secs.max(0),
        })
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.tolerance_secs
    }

    /// Verify a delivery against the current wall clock
    pub fn verify(
        &self,
        webhook_id: &str,
        timestamp: &str,
        signature_header: &str,
        payload: &[u8],
    ) -> PaymentResult<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.verify_at(webhook_id, timestamp, signature_header, payload, now)
    }

    /// Verify a delivery as of `now` (unix seconds)
    pub fn verify_at(
        &self,
        webhook_id: &str,
        timestamp: &str,
        signature_header: &str,
        payload: &[u8],
        now: i64,
    ) -> PaymentResult<()> {
        let sent_at: i64 = timestamp.trim().parse().map_err(|_| {
            tracing::warn!(timestamp = %timestamp, "Webhook timestamp is not numeric");
            PaymentError::WebhookTimestampInvalid(format!("'{}' is not unix seconds", timestamp))
        })?;

        let drift = now.saturating_sub(sent_at).saturating_abs();
        if drift > self.tolerance_secs {
            tracing::warn!(
                timestamp = sent_at,
                now = now,
                diff = drift,
                tolerance = self.tolerance_secs,
                "Webhook timestamp outside tolerance"
            );
            return Err(PaymentError::WebhookTimestampInvalid(format!(
                "{}s from now exceeds {}s tolerance",
                drift, self.tolerance_secs
            )));
        }

        let candidates = parse_signature_header(signature_header);
        if candidates.is_empty() {
            tracing::warn!("No v1 signature in webhook-signature header");
            return Err(PaymentError::WebhookSignatureInvalid);
        }

        let expected = self.sign(webhook_id, timestamp, payload)?;
        let matched = candidates
            .iter()
            .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

        if !matched {
            tracing::warn!(
                webhook_id = %webhook_id,
                candidates = candidates.len(),
                "Webhook signature mismatch"
            );
            return Err(PaymentError::WebhookSignatureInvalid);
        }

        Ok(())
    }

    /// Compute the base64 signature for a delivery
    pub fn sign(&self, webhook_id: &str, timestamp: &str, payload: &[u8]) -> PaymentResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PaymentError::Internal(format!("HMAC key rejected: {}", e)))?;
        mac.update(webhook_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// Extract every `v1` signature from a `webhook-signature` header
fn parse_signature_header(header: &str) -> Vec<&str> {
    header
        .split_whitespace()
        .filter_map(|token| token.split_once(','))
        .filter(|(version, signature)| *version == SIGNATURE_VERSION && !signature.is_empty())
        .map(|(_, signature)| signature)
        .collect()
}
