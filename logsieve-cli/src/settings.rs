//! Configuration resolution for the logsieve binary.
//!
//! Merges configuration sources in precedence order:
//! CLI arguments > `LOGSIEVE_*` environment variables > configuration
//! file > defaults. Also enforces that the supervised command is given
//! through exactly one channel (configuration or process arguments,
//! never both).

use anyhow::{Result, bail};
use logsieve_core::config::LogsieveConfig;

use crate::cli::Cli;

/// Resolve the immutable configuration snapshot for this invocation.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file cannot be read or parsed
/// - The command is specified both in configuration and as arguments
/// - Validation of the merged configuration fails
pub async fn resolve_config(cli: &Cli) -> Result<LogsieveConfig> {
    let mut config = match &cli.config {
        Some(path) => LogsieveConfig::from_file(path).await?,
        None => LogsieveConfig::default(),
    };

    config.apply_env_overrides();

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }

    if !cli.command.is_empty() {
        if !config.command.argv.is_empty() {
            bail!("cannot specify the command both in configuration and as process arguments");
        }
        config.command.argv = cli.command.clone();
    }

    config.validate()?;
    Ok(config)
}
