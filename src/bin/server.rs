//! LearnForge API server binary

use learnforge::api::{create_router, AppState};
use learnforge::AppConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!(
        "Starting LearnForge {} ({})",
        learnforge::VERSION,
        config.server.environment
    );

    let state = AppState::new(config).await?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
