//! logsieve binary entry point.
//!
//! Wires the resolved configuration to a [`SievePipeline`] over
//! stdin/stdout and installs the OS signal watcher that starts the
//! cooperative shutdown.
//!
//! # Exit codes
//!
//! * `0` - clean shutdown
//! * `1` - configuration or initialization failure
//! * `3` - running-pipeline error (command failure, write failure,
//!   input error)

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use logsieve_cli::cli::Cli;
use logsieve_cli::logging;
use logsieve_cli::settings;
use logsieve_pipeline::{PipelineConfig, SievePipeline, SievePipelineBuilder};

const EXIT_INIT_FAILURE: u8 = 1;
const EXIT_PIPELINE_FAILURE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match settings::resolve_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not initialized yet, report on stderr directly.
            eprintln!("logsieve: {e:#}");
            return ExitCode::from(EXIT_INIT_FAILURE);
        }
    };

    if cli.validate {
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init_tracing(&config.general) {
        eprintln!("logsieve: {e:#}");
        return ExitCode::from(EXIT_INIT_FAILURE);
    }

    tracing::info!("logsieve starting");

    let pipeline_config = PipelineConfig::from_core(&config);
    let mut pipeline = match SievePipelineBuilder::new()
        .config(pipeline_config)
        .reader(tokio::io::stdin())
        .writer(tokio::io::stdout())
        .build()
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "failed to build pipeline");
            return ExitCode::from(EXIT_INIT_FAILURE);
        }
    };

    if let Err(e) = pipeline.init().await {
        tracing::error!(error = %e, "pipeline initialization failed");
        close_pipeline(&mut pipeline);
        return ExitCode::from(EXIT_INIT_FAILURE);
    }

    // SIGINT/SIGTERM cancel the shared lifetime token; every task winds
    // down cooperatively from there.
    if let Some(token) = pipeline.shutdown_token() {
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => {
                    tracing::info!(signal, "shutdown signal received");
                    token.cancel();
                }
                Err(e) => tracing::error!(error = %e, "failed to install signal handlers"),
            }
        });
    }

    let run_result = pipeline.run().await;
    close_pipeline(&mut pipeline);

    match run_result {
        Ok(()) => {
            tracing::info!("logsieve shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline failed");
            ExitCode::from(EXIT_PIPELINE_FAILURE)
        }
    }
}

/// Best-effort teardown; aggregated close errors are logged, not fatal.
fn close_pipeline(pipeline: &mut SievePipeline) {
    if let Err(e) = pipeline.close() {
        tracing::error!(error = %e, "teardown reported errors");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
