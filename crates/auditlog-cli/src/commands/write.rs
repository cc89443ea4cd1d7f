//! Write command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use auditlog::{context, AuditLogConfig, AuditSinkConfig, Logger};
use clap::Args;
use tracing::info;

/// Arguments for the write command.
#[derive(Args)]
pub struct WriteArgs {
    /// Message to record
    pub message: String,

    /// Account the event happened on behalf of
    #[arg(long)]
    pub account: Option<String>,

    /// Correlation id of the originating request
    #[arg(long, env = "TRANSACTION_ID")]
    pub transaction_id: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Audit trail file (overrides the configuration)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Runs the write command.
pub fn run(args: &WriteArgs) -> Result<()> {
    let config = load_config(args)?;
    let logger = config.build().context("Failed to open audit logger")?;

    info!(account = ?args.account, "Writing audit record");
    context::with_transaction_id(args.transaction_id.as_deref(), || {
        logger.with_account(args.account.as_deref(), || logger.audit(&args.message))
    })?;

    logger.close()?;
    Ok(())
}

fn load_config(args: &WriteArgs) -> Result<AuditLogConfig> {
    let mut config = match &args.config {
        Some(path) => AuditLogConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AuditLogConfig::new().with_audit(AuditSinkConfig::Stdout),
    }
    .with_env_overrides();

    if let Some(path) = &args.output {
        config = config.with_audit(AuditSinkConfig::File { path: path.clone() });
    }
    Ok(config)
}
