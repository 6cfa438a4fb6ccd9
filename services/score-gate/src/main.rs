//! Score Gate Service - Main Entry Point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_common::{init_tracing, TracingConfig};
use tracing::info;

use score_gate::keys::env_lookup;
use score_gate::observability::GateMetrics;
use score_gate::shutdown::{wait_for_signal, ShutdownCoordinator};
use score_gate::sweeper::Sweeper;
use score_gate::{create_router, AppState, Config, Stores};

const SERVICE_NAME: &str = "score-gate-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    init_tracing(
        &TracingConfig::default()
            .with_service_name(SERVICE_NAME)
            .with_log_level(config.log_level.clone())
            .with_json_output(config.log_json),
    )?;

    info!(
        issuer = %config.token_issuer,
        audience = %config.token_audience,
        ttl_seconds = config.token_ttl_seconds,
        demo_mode = ?config.demo_mode,
        "Starting Score Gate Service"
    );

    let stores = Stores::in_memory();
    let metrics = GateMetrics::new().context("registering metrics")?;

    // Key resolution failures do not stop startup; they surface per request
    let state = Arc::new(AppState::new(&config, env_lookup, &stores, metrics.clone()));

    let mut shutdown_coordinator = ShutdownCoordinator::new();
    let sweeper = Sweeper::new(
        Arc::clone(&stores.replay),
        Arc::clone(&stores.rate_limiter),
        metrics,
    );
    shutdown_coordinator.spawn("sweeper", sweeper.run(config.sweep_interval()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!("Score Gate Service listening on {}", config.bind_addr());

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(wait_for_signal())
        .await
        .context("serving HTTP")?;

    shutdown_coordinator
        .shutdown(Duration::from_secs(config.shutdown_timeout_seconds))
        .await;

    info!("Score Gate Service stopped");
    Ok(())
}
