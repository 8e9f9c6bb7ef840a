//! `gwretry exec` – run a program under gateway backoff.
//!
//! A non-zero exit is reported as a gateway error carrying the program's
//! stderr, so the configured markers decide whether it is retried. Failing to
//! spawn the program is not a gateway error and is never retried.

use anyhow::{Context, Result};
use gwretry_core::config::GatewayRetryConfig;
use gwretry_core::retry::{
    duration_from_secs, BackoffPolicy, GatewayBackoff, GatewayError, RetryError,
};
use std::process::Output;
use tokio::process::Command;

/// Policy overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub coordination: bool,
    pub timeout_secs: Option<f64>,
    pub context: Option<String>,
}

/// Policy for this invocation: the configured (or coordination) policy with overrides applied.
pub fn resolve_policy(cfg: &GatewayRetryConfig, opts: &ExecOptions) -> Result<BackoffPolicy> {
    let base = if opts.coordination {
        BackoffPolicy::coordination()
    } else {
        cfg.backoff_policy()?
    };
    let mut builder = base.to_builder();
    if let Some(secs) = opts.timeout_secs {
        builder = builder.timeout(duration_from_secs("--timeout", secs)?);
    }
    if let Some(context) = &opts.context {
        builder = builder.timeout_context(context.clone());
    }
    Ok(builder.build()?)
}

/// Map a finished process to the gateway call result.
fn call_result(program: &str, output: Output) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("{} exited with {}", program, output.status)
    } else {
        stderr
    };
    Err(GatewayError::new(message).into())
}

async fn invoke(program: &str, args: &[String]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to run {}", program))?;
    call_result(program, output)
}

pub async fn run_exec(
    cfg: &GatewayRetryConfig,
    opts: &ExecOptions,
    command: &[String],
) -> Result<()> {
    let (program, args) = command.split_first().context("no program given")?;
    let policy = resolve_policy(cfg, opts)?;
    tracing::info!(
        program = %program,
        timeout = ?policy.timeout(),
        context = policy.timeout_context(),
        "running under gateway backoff"
    );

    let mut backoff = GatewayBackoff::new(policy).with_classifier(cfg.classifier());
    let stdout = backoff
        .run(move || invoke(program, args))
        .await
        .map_err(RetryError::into_anyhow)?;
    print!("{}", stdout);
    Ok(())
}
