//! Storefront API Server
//!
//! Receives payment webhooks, finalizes orders and sends order confirmations.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use storefront_api::{create_router, AppState, Config};
use storefront_payments::{NotificationQueue, OrderEmailService, WebhookHandler};
use storefront_shared::{create_pool, run_migrations, PgStore};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long queued confirmations get to send after shutdown starts
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_api=debug,storefront_payments=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Storefront API Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    } else {
        tracing::info!("Database migrations skipped (RUN_MIGRATIONS=false)");
    }

    let store = Arc::new(PgStore::new(pool));

    let email = OrderEmailService::new(config.email.clone());
    if !email.is_enabled() {
        tracing::warn!("RESEND_API_KEY not set - order confirmation emails will only be logged");
    }
    let (notifications, notification_task) =
        NotificationQueue::start(Arc::new(email), config.notification_queue_capacity);

    let webhooks = WebhookHandler::new(store.clone(), store, notifications);
    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::new(config, webhooks)?;

    let app = create_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it the last queue handle) is gone; let pending emails go out
    tracing::info!("Server stopped, draining notification queue");
    if tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, notification_task)
        .await
        .is_err()
    {
        tracing::warn!("Notification queue did not drain in time - pending emails dropped");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
