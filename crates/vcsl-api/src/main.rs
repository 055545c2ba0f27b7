//! # vcsl-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Configuration comes from `VCSL_*`
//! environment variables, see [`vcsl_api::config::ServiceConfig`].

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use vcsl_api::config::ServiceConfig;
use vcsl_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;
    let key = config.signing_key()?;
    let state = AppState::from_config(&config, key)?.with_metrics(metrics);

    let app = vcsl_api::app(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "vcsl-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Structured logging, JSON when `VCSL_LOG_JSON=1`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("VCSL_LOG_JSON").is_ok_and(|v| v == "1");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
