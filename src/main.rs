use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

mod api;
mod config;
mod discount;
mod extract;
mod models;
mod scraper;
mod session;

use api::AppState;
use config::AppConfig;
use scraper::StockScraper;
use session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting KTW stock API");

    let config_path =
        std::env::var("KTW_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = AppConfig::load(&config_path);
    if config.api_token.is_empty() {
        warn!("No api_token configured; all /api requests will be rejected");
    }

    // One session for the process lifetime; cookies persist inside it
    let session = Arc::new(Session::new(&config)?);

    info!("Attempting initial login...");
    if !session.login().await {
        error!("Initial login failed; will retry lazily on first batch");
    }
    info!("Session state after startup: {:?}", session.auth_state());

    let scraper = StockScraper::new(session, &config.discount_config_path);
    let state = AppState {
        source: Arc::new(scraper),
        api_token: config.api_token.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, api::router(state))
        .await
        .context("HTTP server error")?;

    Ok(())
}
