//! `gwretry classify` – show how a gateway error message would be treated.

use gwretry_core::config::GatewayRetryConfig;

pub fn verdict(cfg: &GatewayRetryConfig, message: &str) -> &'static str {
    if cfg.classifier().is_transient_message(message) {
        "transient"
    } else {
        "permanent"
    }
}

pub fn run_classify(cfg: &GatewayRetryConfig, message: &str) {
    println!("{}", verdict(cfg, message));
}
