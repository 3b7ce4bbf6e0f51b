//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use reviewflow::config::{ENV_API_KEY, ENV_API_URL};

/// Reviewflow - trigger and track AI pull request reviews
#[derive(Parser, Debug)]
#[command(
    name = "reviewflow",
    author,
    version,
    about = "Trigger and track a remote pull request review pipeline",
    long_about = "Starts a review pipeline run for a pull request and polls it to completion.\n\n\
                  The `orchestrate` command runs the review stages locally against\n\
                  HTTP compute endpoints instead of the hosted pipeline."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "REVIEWFLOW_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true, env = "REVIEWFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Review API base URL
    #[arg(long, global = true, env = ENV_API_URL)]
    pub api_url: Option<String>,

    /// Review API key
    #[arg(long, global = true, env = ENV_API_KEY, hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a review and wait for it to finish
    Review(ReviewArgs),

    /// Check the status of a run once
    Status(StatusArgs),

    /// Run the review stages locally against compute endpoints
    Orchestrate(OrchestrateArgs),
}

/// Where to read the request from
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Path to the request JSON, or `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub request: PathBuf,
}

/// Arguments for the `review` command
#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub input: RequestArgs,

    /// Use the longer initial delay for large pull requests
    #[arg(long)]
    pub large: bool,

    /// Override the number of status checks before giving up
    #[arg(long)]
    pub deadline_attempts: Option<u32>,
}

/// Arguments for the `status` command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Execution handle returned when the run was started
    pub handle: String,
}

/// Arguments for the `orchestrate` command
#[derive(Args, Debug, Clone)]
pub struct OrchestrateArgs {
    #[command(flatten)]
    pub input: RequestArgs,

    /// Endpoint of the review compute unit
    #[arg(long, env = "REVIEWFLOW_REVIEW_URL")]
    pub review_url: Option<String>,

    /// Endpoint of the notification compute unit
    #[arg(long, env = "REVIEWFLOW_NOTIFY_URL")]
    pub notify_url: Option<String>,

    /// Send a notification when a stage fails
    #[arg(long)]
    pub notify_on_failure: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// JSON lines
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_review() {
        let cli = Cli::try_parse_from([
            "reviewflow",
            "--api-url",
            "https://api.example.com/prod",
            "review",
            "--request",
            "pr.json",
            "--large",
            "--deadline-attempts",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("https://api.example.com/prod"));
        match cli.command {
            Commands::Review(args) => {
                assert_eq!(args.input.request, PathBuf::from("pr.json"));
                assert!(args.large);
                assert_eq!(args.deadline_attempts, Some(4));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["reviewflow", "-v", "status", "arn:aws:states:x"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Status(ref a) if a.handle == "arn:aws:states:x"));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["reviewflow", "-q", "-v", "status", "h"]).is_err());
    }
}
