//! # Reviewflow CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading from file, environment and flags
//! - Trigger-and-poll of the hosted review pipeline
//! - Local orchestration of the review stages
//! - Exit codes per terminal outcome

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::Layer;

use cli::{Cli, Commands};
use commands::{exit, exit_code, run_orchestrate, run_review, run_status};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { exit::USAGE } else { exit::SUCCESS };
            if e.print().is_err() {
                eprintln!("{e}");
            }
            return ExitCode::from(code);
        }
    };

    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {e:#}");
        return ExitCode::from(exit::USAGE);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Reviewflow CLI starting");

    let result = match &cli.command {
        Commands::Review(args) => run_review(&cli, args).await,
        Commands::Status(args) => run_status(&cli, args).await,
        Commands::Orchestrate(args) => run_orchestrate(&cli, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else {
        let default_level = match cli.verbose {
            0 => "warn",
            1 => "info,reviewflow=debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let fmt_layer = match cli.log_format {
        cli::LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        cli::LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        cli::LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
