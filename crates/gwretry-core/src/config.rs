use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::{duration_from_secs, BackoffPolicy, ErrorClassifier, MarkerSet, PolicyError};

/// Backoff parameters (optional `[backoff]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Total budget for one retry sequence, in seconds.
    pub timeout_secs: f64,
    /// First delay between attempts, in seconds (e.g. 0.75 = 750ms).
    pub base_delay_secs: f64,
    /// Upper bound on the delay before jitter, in seconds.
    pub max_delay_secs: f64,
    /// Symmetric jitter fraction in [0, 1).
    pub jitter: f64,
    /// Label used in timeout messages.
    pub context: String,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from(&BackoffPolicy::default())
    }
}

impl From<&BackoffPolicy> for BackoffConfig {
    fn from(p: &BackoffPolicy) -> Self {
        Self {
            timeout_secs: p.timeout().as_secs_f64(),
            base_delay_secs: p.base_delay().as_secs_f64(),
            max_delay_secs: p.max_delay().as_secs_f64(),
            jitter: p.jitter(),
            context: p.timeout_context().to_string(),
        }
    }
}

impl BackoffConfig {
    pub fn to_policy(&self) -> Result<BackoffPolicy, PolicyError> {
        BackoffPolicy::builder()
            .timeout(duration_from_secs("timeout_secs", self.timeout_secs)?)
            .base_delay(duration_from_secs("base_delay_secs", self.base_delay_secs)?)
            .max_delay(duration_from_secs("max_delay_secs", self.max_delay_secs)?)
            .jitter(self.jitter)
            .timeout_context(self.context.clone())
            .build()
    }
}

/// Extra classifier markers (optional `[markers]` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default)]
    pub transient: Vec<String>,
    #[serde(default)]
    pub non_transient: Vec<String>,
    /// Use only the markers listed here instead of extending the built-in sets.
    #[serde(default)]
    pub replace_defaults: bool,
}

/// Configuration loaded from `~/.config/gwretry/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayRetryConfig {
    /// Optional backoff policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,
    /// Optional marker overrides.
    #[serde(default)]
    pub markers: Option<MarkerConfig>,
}

impl GatewayRetryConfig {
    /// Validated policy from the `[backoff]` section, or the default policy.
    pub fn backoff_policy(&self) -> Result<BackoffPolicy, PolicyError> {
        match &self.backoff {
            Some(b) => b.to_policy(),
            None => Ok(BackoffPolicy::default()),
        }
    }

    /// Classifier with the built-in markers, extended or replaced by `[markers]`.
    pub fn classifier(&self) -> ErrorClassifier {
        let Some(m) = &self.markers else {
            return ErrorClassifier::default();
        };
        if m.replace_defaults {
            return ErrorClassifier::new(
                MarkerSet::new(&m.transient),
                MarkerSet::new(&m.non_transient),
            );
        }
        let mut classifier = ErrorClassifier::default();
        classifier.extend_transient(&m.transient);
        classifier.extend_non_transient(&m.non_transient);
        classifier
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("gwretry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Parse configuration from a TOML file.
pub fn load_from_path(path: &Path) -> Result<GatewayRetryConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: GatewayRetryConfig = toml::from_str(&data)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    cfg.backoff_policy()
        .with_context(|| format!("invalid [backoff] in {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<GatewayRetryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = GatewayRetryConfig {
            backoff: Some(BackoffConfig::default()),
            markers: Some(MarkerConfig::default()),
        };
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}
