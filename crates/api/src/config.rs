use std::net::SocketAddr;

use clap::Parser;

/// Runtime configuration, from flags or the environment
#[derive(Clone, Debug, Parser)]
#[command(name = "jeeva-health-api")]
#[command(about = "Consent-gated health records service")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "JEEVA_BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Log filter directives, e.g. `info` or `consent=debug,info`
    #[arg(long, env = "JEEVA_LOG", default_value = "info")]
    pub log_filter: String,

    /// Seconds a cached profile is trusted before it is reloaded
    #[arg(long, env = "JEEVA_PROFILE_CACHE_TTL_SECS", default_value = "300")]
    pub profile_cache_ttl_secs: u32,

    /// Create a patient profile when consent is requested for an unknown email
    #[arg(long, env = "JEEVA_AUTO_PROVISION")]
    pub auto_provision_patients: bool,
}

impl Config {
    pub fn profile_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.profile_cache_ttl_secs))
    }
}
