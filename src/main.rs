//! Stockcast server - single-ticker price forecasting over HTTP
//!
//! Serves `POST /predict` with `{"ticker": "...", "date": "YYYY-MM-DD"}`,
//! training a per-ticker model on first use and reusing the persisted
//! artifacts afterwards.
//!
//! # Usage
//! ```sh
//! BIND_ADDR=127.0.0.1:5001 cargo run
//! ```
//!
//! # Environment Variables
//! - `BIND_ADDR` - Listen address (default: 127.0.0.1:5001)
//! - `MODEL_DIR` - Directory for persisted model/scaler pairs (default: model)
//! - `HISTORY_START` - First day of fetched history (default: 2020-01-01)

use anyhow::Result;
use std::sync::Arc;
use stockcast::application::forecasting::PredictionService;
use stockcast::config::Config;
use stockcast::infrastructure::model_store::ModelStore;
use stockcast::infrastructure::yahoo::YahooHistoryAcquirer;
use stockcast::interfaces::http;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Stockcast Server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: bind={}, model_dir={:?}, history_start={}",
        config.bind_addr, config.model_dir, config.history_start
    );

    let acquirer = Arc::new(YahooHistoryAcquirer::new(
        config.yahoo_base_url.clone(),
        config.yahoo_fallback_url.clone(),
        config.history_start,
        &config.transport,
    ));
    let store = ModelStore::new(config.model_dir.clone());
    let service = Arc::new(PredictionService::new(
        acquirer,
        store,
        config.forecast.clone(),
    ));

    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}. Press Ctrl+C to shutdown.", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received. Exiting...");
}
