mod bootstrap;
mod health;
mod idempotency;
mod routes;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use tripflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use tripflow_core::config::LogFormat::*;

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

    spawn_idempotency_sweeper(
        app.state.idempotency.clone(),
        app.config.idempotency.sweep_interval_secs,
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "tripflow-server started"
    );

    axum::serve(listener, bootstrap::router(app.state.clone()))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tripflow-server stopping"
    );

    Ok(())
}

fn spawn_idempotency_sweeper(
    store: std::sync::Arc<dyn tripflow_core::idempotency::IdempotencyStore>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            let removed = store.sweep(Utc::now());
            if removed > 0 {
                tracing::debug!(
                    event_name = "idempotency.sweep",
                    removed,
                    "expired idempotency entries removed"
                );
            }
        }
    });
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
