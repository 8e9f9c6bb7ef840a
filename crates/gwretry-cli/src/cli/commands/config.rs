//! `gwretry config` – print the effective configuration as TOML.

use anyhow::Result;
use gwretry_core::config::{BackoffConfig, GatewayRetryConfig, MarkerConfig};

/// Configuration with every optional section filled in.
pub fn effective(cfg: &GatewayRetryConfig) -> Result<GatewayRetryConfig> {
    let policy = cfg.backoff_policy()?;
    Ok(GatewayRetryConfig {
        backoff: Some(BackoffConfig::from(&policy)),
        markers: Some(cfg.markers.clone().unwrap_or_default()),
    })
}

pub fn run_config(cfg: &GatewayRetryConfig) -> Result<()> {
    let toml = toml::to_string_pretty(&effective(cfg)?)?;
    print!("{}", toml);
    Ok(())
}
