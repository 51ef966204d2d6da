// Main entry point for the wallet auth server

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_auth::{kernel::ServerDeps, server::build_app, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_auth=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wallet auth server");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        session_kind = %config.auth.session_kind,
        "Configuration loaded"
    );

    let deps = ServerDeps::from_config(&config)
        .await
        .context("Failed to build dependencies")?;

    let app = build_app(deps);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
