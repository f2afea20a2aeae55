//! Zapcast - WhatsApp campaign dispatcher entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zapcast_api::AppState;
use zapcast_common::config::{Config, LoggingConfig};
use zapcast_core::EvolutionGatewayClient;
use zapcast_storage::db::DatabasePool;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config.logging);

    info!("Starting Zapcast...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let gateway = EvolutionGatewayClient::new(&config.gateway)
        .context("Failed to build gateway client")?;
    if config.gateway.url.is_none() {
        warn!("No default gateway URL configured; instances must provide their own");
    }

    let bind = format!("{}:{}", config.server.bind_address, config.api.port);
    let stalled_after = Duration::from_secs(config.server.stalled_after_secs);

    let state = AppState::new(db_pool, config, Arc::new(gateway));

    // Campaigns left running by a previous process
    let recovered = state.manager.recover_stalled(stalled_after).await?;
    if !recovered.is_empty() {
        info!("Reset {} stalled campaigns to pending", recovered.len());
    }

    let app = zapcast_api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind API server on {}", bind))?;
    info!("Starting API server on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Zapcast shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
