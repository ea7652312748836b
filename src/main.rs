mod config;
mod drive;
mod etsy;
mod http;
mod listing;
mod llm;
mod metrics;
mod models;
mod pipeline;
#[cfg(test)]
mod testing;
mod workspace;

use clap::{Parser, Subcommand};
use config::AppConfig;
use drive::DriveClient;
use etsy::EtsyClient;
use eyre::{Result, WrapErr};
use llm::OpenAiClient;
use models::PassOutcome;
use pipeline::{Pipeline, PipelineSettings};
use std::{future::Future, process::ExitCode, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "drive-lister", version, about = "Publish Drive product folders as Etsy draft listings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process at most one product folder, then exit.
    Run,
    /// Run a pass every interval until interrupted.
    Watch {
        /// Seconds between passes; defaults to WATCH_INTERVAL_SECS.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Verify storage credentials by listing one file.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match run(cli.command.unwrap_or(Command::Run)).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(target = "lister.main", "{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(command: Command) -> Result<bool> {
    let config = AppConfig::from_env().wrap_err("invalid configuration")?;
    let storage = DriveClient::connect(&config.drive)
        .await
        .wrap_err("unable to authenticate with Google Drive")?;

    match command {
        Command::Check => check(&storage).await,
        Command::Run => {
            let pipeline = build_pipeline(&config, storage);
            let report = pipeline.run_once().await;
            log_report(&report);
            Ok(!matches!(report.outcome, PassOutcome::Failed { .. }))
        }
        Command::Watch { interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.watch_interval);
            let pipeline = build_pipeline(&config, storage);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            watch(&pipeline, interval, shutdown).await;
            Ok(true)
        }
    }
}

fn build_pipeline(config: &AppConfig, storage: DriveClient) -> Pipeline {
    Pipeline::new(
        Arc::new(storage),
        Arc::new(OpenAiClient::new(&config.llm)),
        Arc::new(EtsyClient::new(&config.etsy)),
        PipelineSettings::from_config(config),
    )
}

async fn check(storage: &DriveClient) -> Result<bool> {
    match storage.verify_access().await {
        Ok(Some(file)) => {
            info!(target = "lister.main", file_id = %file.id, name = %file.name, "drive_connection_ok");
            Ok(true)
        }
        Ok(None) => {
            info!(target = "lister.main", "drive_connection_ok_no_files_visible");
            Ok(true)
        }
        Err(err) => {
            error!(target = "lister.main", error = %err, "drive_connection_failed");
            Ok(false)
        }
    }
}

/// Runs passes until `shutdown` resolves and returns how many ran. A shutdown
/// during a pass lets that pass finish so a created listing is never left
/// without its folder move.
async fn watch(pipeline: &Pipeline, interval: Duration, shutdown: impl Future<Output = ()>) -> usize {
    info!(target = "lister.main", interval_secs = interval.as_secs(), "watch_started");
    tokio::pin!(shutdown);
    let mut passes = 0;
    loop {
        let pass = pipeline.run_once();
        tokio::pin!(pass);
        let mut stopping = false;
        let report = loop {
            tokio::select! {
                report = &mut pass => break report,
                _ = &mut shutdown, if !stopping => {
                    info!(target = "lister.main", "shutdown_requested_finishing_pass");
                    stopping = true;
                }
            }
        };
        passes += 1;
        log_report(&report);
        if stopping {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }
    info!(target = "lister.main", passes, "watch_stopped");
    passes
}

fn log_report(report: &models::PassReport) {
    match serde_json::to_string(report) {
        Ok(json) => info!(target = "lister.main", pass_id = %report.pass_id, report = %json, "pass_report"),
        Err(err) => warn!(target = "lister.main", error = %err, "pass_report_unserializable"),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
