//! Jeeva Health API
//!
//! HTTP boundary over the profile, consent and record services. Callers are
//! identified by the `x-user-email` header set by the authenticating proxy.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::{AppState, SharedState, USER_EMAIL_HEADER};

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
pub fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!(err))
}

pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
