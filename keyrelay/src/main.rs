use std::sync::Arc;

use clap::Parser;
use keyrelay::{RelayConfig, Settings};
use tracing_subscriber::{filter::EnvFilter, fmt};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();
    let config = Arc::new(RelayConfig::from_settings(&settings)?);

    tracing::debug!(
        issuer = %config.issuer,
        jwks_url = %config.jwks_url,
        requests_per_minute = config.resolver.requests_per_minute,
        "loaded configuration"
    );

    let client = reqwest::Client::builder().build()?;
    let app = keyrelay::router(config, client);

    let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        let error: &(dyn std::error::Error + Send + Sync + 'static) = &err;
        tracing::error!(error, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
