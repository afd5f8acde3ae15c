use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jeeva_health_api::{init_tracing, router, shutdown_signal, AppState, Config};
use jeeva_health_shared::SystemClock;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_filter)?;

    if config.auto_provision_patients {
        tracing::warn!("patient auto-provisioning is enabled");
    }

    let state = Arc::new(AppState::in_memory(&config, Arc::new(SystemClock)));
    let app = router(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .context("failed to bind TCP listener")?;
    tracing::info!(addr = %config.bind, "jeeva health api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
