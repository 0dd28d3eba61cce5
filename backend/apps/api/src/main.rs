//! API Server Entry Point
//!
//! Uses `anyhow` for startup errors only; request-level errors are rendered by
//! `AuthError`.

use api::{AppConfig, bootstrap, shutdown_signal, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    telemetry::init();

    let config = AppConfig::from_env()?;
    tracing::debug!(config = ?config, "Configuration loaded");

    let app = bootstrap(&config).await?;
    tracing::info!(addr = %app.local_addr()?, "Listening");

    app.run_until(shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
