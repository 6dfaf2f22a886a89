use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tokenwatch_streamer::api::{self, AppState};
use tokenwatch_streamer::chains::registry::ChainRegistry;
use tokenwatch_streamer::config::Config;
use tokenwatch_streamer::session::SessionManager;
use tokenwatch_streamer::stats::price::{PriceOracle, PriceSource};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Tokenwatch streamer starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        chains = config.chains.len(),
        "Configuration loaded from {}",
        config_path
    );

    // Build shared chain clients once; every session reads them by reference
    let registry = Arc::new(ChainRegistry::from_config(&config)?);
    let prices: Arc<dyn PriceSource> = Arc::new(PriceOracle::new());
    let sessions = SessionManager::new(registry.clone(), prices, &config.stream, &config.stats);

    // Create shutdown signal
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received, stopping server...");
                shutdown.cancel();
            }
        });
    }

    api::serve(
        AppState { sessions, registry },
        &config.server.host,
        config.server.port,
        shutdown,
    )
    .await?;

    tracing::info!("Tokenwatch streamer stopped gracefully");
    Ok(())
}
