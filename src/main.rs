//! Reimage entry point: one reconciliation pass per invocation.

use std::process::ExitCode;
use std::time::Duration;

use log::{error, info, warn};
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod config;
mod detector;
mod error;
mod events;
mod inventory;
mod orchestrator;
mod reconcile;
mod runtime;
mod types;

use config::Config;
use events::LogSink;
use reconcile::run_pass;
use runtime::DockerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::load()?;
    info!("Starting reimage pass with config: {:?}", cfg);

    let runtime = DockerRuntime::connect()?;

    let cancel = CancellationToken::new();

    // Ctrl+C or the deadline stop the pass at the next container boundary.
    let on_signal = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl+C, finishing in-flight recreation and stopping...");
                on_signal.cancel();
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });
    let deadline_handle = cfg.timeout_secs.map(|secs| {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Pass deadline of {}s reached, stopping...", secs);
            on_deadline.cancel();
        })
    });

    let result = run_pass(&runtime, &LogSink, &cancel, &cfg.pass_settings()).await;

    signal_handle.abort();
    if let Some(handle) = deadline_handle {
        handle.abort();
    }

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            error!("stage={} target={}: {}", err.stage(), err.target(), err);
            return Ok(ExitCode::from(2));
        }
    };

    if cfg.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    info!(
        "Pass complete: {} references checked, {} updated, {} recreated, {} skipped, {} failures",
        report.references_checked,
        report.updated.len(),
        report.recreated.len(),
        report.skipped.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        error!(
            "stage={} target={}: {}",
            failure.stage, failure.target, failure.message
        );
    }
    if report.cancelled {
        warn!("Pass was cancelled before it finished.");
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
