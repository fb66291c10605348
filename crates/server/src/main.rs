mod bootstrap;
mod health;
mod intake;
mod relay;

use std::time::Duration;

use anyhow::{Context, Result};
use triage_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use triage_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let bind = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let router = health::router(app.db_pool.clone())
        .merge(intake::router(intake::IntakeState { runtime: app.runtime.clone() }));

    tracing::info!(
        event_name = "system.server.listening",
        address = %bind,
        "customer intake and health endpoints listening"
    );

    let api = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(event_name = "system.server.api_failed", error = %error, "http server exited");
        }
    });

    // The socket runner returns Ok when the transport is exhausted; the HTTP
    // surface keeps serving customers either way.
    app.slack_runner.start().await?;

    tracing::info!(event_name = "system.server.started", "triage-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "triage-server stopping");

    api.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            "database pool did not close within the shutdown grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
