//! CLI argument definitions for logsieve.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Streaming log-filtering proxy.
///
/// Reads a line-oriented stream (stdin, or the combined stdout/stderr
/// of a supervised command), decides per JSON line whether it reaches
/// the primary output, and optionally tees every line to a rotating
/// capture file.
#[derive(Parser, Debug)]
#[command(name = "logsieve")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to logsieve.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the pipeline.
    #[arg(long)]
    pub validate: bool,

    /// Command to supervise; its stdout/stderr become the input.
    ///
    /// Usually given after `--`. Rejected when `[command].argv` is also
    /// set in the configuration.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
