//! Payment webhook ledger records
//!
//! Each verified webhook event id is recorded once so redeliveries of an
//! already-processed event are acknowledged without being processed again.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

/// Processing state of a recorded webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingResult {
    /// Claimed by a request that has not finished yet
    Processing,
    Success,
    /// Accepted but nothing to do (unknown type, missing order reference, conflict)
    Skipped,
    /// Failed; a redelivery may claim the event again
    Error,
}

impl ProcessingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingResult {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "skipped" => Ok(Self::Skipped),
            "error" => Ok(Self::Error),
            other => Err(StoreError::Corrupt(format!(
                "unknown processing result '{}'",
                other
            ))),
        }
    }
}

/// Stored webhook event record
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub processing_result: ProcessingResult,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processing_started_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
