//! Command implementations.

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use reviewflow::client::{HttpReviewApi, InputSize, Poller, TriggerClient};
use reviewflow::config::ReviewflowConfig;
use reviewflow::core::{ExecutionHandle, PipelineRequest};
use reviewflow::errors::{ErrorKind, ReviewflowError};
use reviewflow::events::LoggingEventSink;
use reviewflow::pipeline::{HttpStageInvoker, Orchestrator};

use crate::cli::{Cli, OrchestrateArgs, RequestArgs, ReviewArgs, StatusArgs};

/// Exit codes reported by the binary.
pub mod exit {
    /// Run finished successfully.
    pub const SUCCESS: u8 = 0;
    /// The pipeline reported a terminal failure.
    pub const PIPELINE_FAILED: u8 = 1;
    /// No terminal status within the polling budget.
    pub const POLL_TIMEOUT: u8 = 2;
    /// The run could not be started.
    pub const TRIGGER_FAILED: u8 = 3;
    /// Bad usage, configuration or input.
    pub const USAGE: u8 = 4;
}

/// Maps a command error to its exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ReviewflowError>() {
        Some(ReviewflowError::TriggerFailure { .. }) => exit::TRIGGER_FAILED,
        Some(ReviewflowError::PollTimeout { .. }) => exit::POLL_TIMEOUT,
        Some(ReviewflowError::Io(_)) => exit::USAGE,
        Some(e) => match e.kind() {
            ErrorKind::InvalidInput | ErrorKind::Configuration => exit::USAGE,
            _ => exit::PIPELINE_FAILED,
        },
        None if err.downcast_ref::<std::io::Error>().is_some() => exit::USAGE,
        None => exit::PIPELINE_FAILED,
    }
}

/// Builds the effective configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli) -> Result<ReviewflowConfig> {
    let config = match &cli.config {
        Some(path) => ReviewflowConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ReviewflowConfig::new(),
    };
    let mut config = config.with_env_overrides();
    if let Some(url) = &cli.api_url {
        config.api.base_url.clone_from(url);
    }
    if let Some(key) = &cli.api_key {
        config.api.api_key.clone_from(key);
    }
    Ok(config)
}

fn read_request(args: &RequestArgs) -> Result<PipelineRequest> {
    let raw = if args.request == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(&args.request)
            .with_context(|| format!("reading request from {}", args.request.display()))?
    };
    let request = PipelineRequest::from_json(&raw)?;
    request.validate()?;
    Ok(request)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `review`: trigger a run and poll it to completion.
pub async fn run_review(cli: &Cli, args: &ReviewArgs) -> Result<ExitCode> {
    let mut config = load_config(cli)?;
    if let Some(attempts) = args.deadline_attempts {
        config.poll.deadline_attempts = attempts;
    }
    config.validate()?;
    let request = read_request(&args.input)?;

    let api = Arc::new(HttpReviewApi::new(&config.api)?);
    let handle = TriggerClient::with_policy(api.clone(), config.trigger.clone())
        .start(&request)
        .await?;
    eprintln!("started execution {handle}");

    let size = if args.large {
        InputSize::Large
    } else {
        InputSize::Standard
    };
    let outcome = Poller::with_policy(api, config.poll.clone())
        .with_events(Arc::new(LoggingEventSink::debug()))
        .wait(&handle, size)
        .await?;

    info!(execution = %handle, result = %outcome.result, "Review finished");
    print_json(&json!({
        "execution": handle,
        "result": outcome.result,
        "body": outcome.body,
    }))?;
    Ok(ExitCode::from(exit::SUCCESS))
}

/// `status`: one classified status check.
pub async fn run_status(cli: &Cli, args: &StatusArgs) -> Result<ExitCode> {
    let config = load_config(cli)?;
    config.validate()?;
    let handle = ExecutionHandle::new(args.handle.clone())?;

    let api = Arc::new(HttpReviewApi::new(&config.api)?);
    let check = Poller::with_policy(api, config.poll.clone())
        .check(&handle)
        .await?;

    let times = check.execution_times();
    print_json(&json!({
        "execution": handle,
        "outcome": check.outcome,
        "status": check.status_label(),
        "started_at": times.map(|t| t.started_at),
        "stopped_at": times.and_then(|t| t.stopped_at),
        "payload": check.payload,
    }))?;
    Ok(ExitCode::from(exit::SUCCESS))
}

/// `orchestrate`: run the stage chain locally.
pub async fn run_orchestrate(cli: &Cli, args: &OrchestrateArgs) -> Result<ExitCode> {
    let mut config = load_config(cli)?;
    if let Some(url) = &args.review_url {
        config.pipeline.review_function_url = Some(url.clone());
    }
    if let Some(url) = &args.notify_url {
        config.pipeline.notify_function_url = Some(url.clone());
    }
    if args.notify_on_failure {
        config.pipeline.notify_on_failure = true;
    }
    let request = read_request(&args.input)?;

    let invoker = Arc::new(HttpStageInvoker::new(&config.pipeline)?);
    let report = Orchestrator::new(invoker)
        .with_notify_on_failure(config.pipeline.notify_on_failure)
        .with_events(Arc::new(LoggingEventSink::info()))
        .run(&request)
        .await?;

    print_json(&serde_json::to_value(&report)?)?;
    report.into_result()?;
    Ok(ExitCode::from(exit::SUCCESS))
}
