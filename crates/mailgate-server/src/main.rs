//! Mailgate - mail-fetching gateway entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use mailgate_api::AppState;
use mailgate_common::types::AdminRole;
use mailgate_common::{Config, Error};
use mailgate_core::{
    hash_password, LogRetentionJob, MemoryRateLimiter, RateLimiterBackend, SharedRateLimiter,
};
use mailgate_storage::{DatabasePool, KvStore};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Mailgate...");

    let config = Config::from_env().map_err(|e| match &e {
        Error::ValidationDetails(details) => {
            for (field, message) in details {
                tracing::error!(field = field.as_str(), "{message}");
            }
            anyhow::anyhow!("configuration is invalid ({} violation(s))", details.len())
        }
        other => anyhow::anyhow!("configuration is invalid: {other}"),
    })?;

    let db = DatabasePool::connect(&config.database_url)
        .await
        .context("database connection failed")?;
    db.migrate().await.context("database migration failed")?;

    let kv = KvStore::connect(config.redis_url.as_deref())
        .await
        .context("shared store connection failed")?;

    // The limiter backend mirrors the shared store: counters are only
    // cross-process when Redis is configured.
    let rate_limiter: Arc<dyn RateLimiterBackend> = if config.redis_url.is_some() {
        Arc::new(SharedRateLimiter::new(kv.clone()))
    } else {
        Arc::new(MemoryRateLimiter::new())
    };
    info!(backend = rate_limiter.name(), "rate limiter ready");

    let state = AppState::new(config, db, kv, rate_limiter)
        .map_err(|e| anyhow::anyhow!("state wiring failed: {e}"))?;

    ensure_default_admin(&state).await?;

    // Log retention runs until shutdown; aborting the handle stops the
    // timer so it cannot keep the process alive.
    let retention = LogRetentionJob::new(
        state.api_logs.clone(),
        state.config.api_log_retention_days,
        state.config.api_log_cleanup_interval_minutes,
    );
    let retention_handle = tokio::spawn(async move { retention.run().await });

    let port = state.config.port;
    let app = mailgate_api::create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "Mailgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    retention_handle.abort();
    info!("Mailgate shutdown complete");
    Ok(())
}

/// Seed the bootstrap admin account on first start
async fn ensure_default_admin(state: &AppState) -> Result<()> {
    let username = &state.config.admin_username;
    if state
        .admins
        .find_by_username(username)
        .await
        .map_err(|e| anyhow::anyhow!("admin lookup failed: {e}"))?
        .is_some()
    {
        return Ok(());
    }

    let password_hash = hash_password(&state.config.admin_password)
        .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {e}"))?;
    state
        .admins
        .create(username, &password_hash, None, AdminRole::SuperAdmin.as_str())
        .await
        .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {e}"))?;
    warn!(username = username.as_str(), "bootstrap admin account created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mailgate=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
