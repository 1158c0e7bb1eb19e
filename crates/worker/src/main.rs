#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storefront Background Worker
//!
//! Handles scheduled jobs including:
//! - Abandoned checkout expiry (hourly)
//! - Webhook ledger cleanup (daily at 3:00 AM UTC)

mod jobs;

use std::sync::Arc;

use storefront_shared::{create_pool, PgStore};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

#[derive(Debug, Error)]
enum WorkerConfigError {
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,

    #[error("Invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

struct WorkerConfig {
    database_url: String,
    checkout_expiry: Duration,
    webhook_retention: Duration,
}

impl WorkerConfig {
    fn from_env() -> Result<Self, WorkerConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or(WorkerConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            database_url,
            checkout_expiry: Duration::hours(env_i64("CHECKOUT_EXPIRY_HOURS", 24)?),
            webhook_retention: Duration::days(env_i64("WEBHOOK_RETENTION_DAYS", 7)?),
        })
    }
}

fn env_i64(name: &'static str, default: i64) -> Result<i64, WorkerConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().parse::<i64>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(WorkerConfigError::Invalid { name, value }),
        },
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Storefront Worker");

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    info!("Database pool created");

    let store = Arc::new(PgStore::new(pool));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Expire abandoned checkouts (hourly, on the hour)
    let expiry_store = store.clone();
    let checkout_expiry = config.checkout_expiry;
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let store = expiry_store.clone();
            Box::pin(async move {
                info!("Running abandoned checkout expiry");
                if let Err(e) = jobs::expire_abandoned_checkouts(
                    store.as_ref(),
                    checkout_expiry,
                    OffsetDateTime::now_utc(),
                )
                .await
                {
                    error!(error = %e, "Abandoned checkout expiry failed");
                }
            })
        })?)
        .await?;
    info!(
        expiry_hours = checkout_expiry.whole_hours(),
        "Scheduled: Abandoned checkout expiry (hourly)"
    );

    // Job 2: Cleanup old webhook ledger entries (daily at 3:00 AM UTC)
    let cleanup_store = store.clone();
    let webhook_retention = config.webhook_retention;
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let store = cleanup_store.clone();
            Box::pin(async move {
                info!("Running webhook ledger cleanup");
                if let Err(e) = jobs::purge_webhook_ledger(
                    store.as_ref(),
                    webhook_retention,
                    OffsetDateTime::now_utc(),
                )
                .await
                {
                    error!(error = %e, "Webhook ledger cleanup failed");
                }
            })
        })?)
        .await?;
    info!(
        retention_days = webhook_retention.whole_days(),
        "Scheduled: Webhook ledger cleanup (daily at 3:00 AM)"
    );

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;
    info!("Storefront Worker started successfully with 2 scheduled jobs");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping worker");

    Ok(())
}
