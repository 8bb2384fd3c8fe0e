#![forbid(unsafe_code)]

//! `agency-client`: submits an agency's records to the aggregator.
//!
//! Loads configuration, opens the record file, wires the shutdown
//! coordinator to OS signals, and runs the session loop to completion.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agency_client::session::SessionLoop;
use agency_client::shutdown::{forward_os_signals, signal_channel, ShutdownCoordinator};
use agency_client::source::CsvRecordSource;
use agency_client::{AppError, ClientConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agency-client", about = "Agency batch submission client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Environment variables alone
    /// are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the agency identity.
    #[arg(long)]
    agency: Option<u8>,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("agency-client: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_tracing(args.log_format, &config.log_level) {
        eprintln!("agency-client: {err}");
        return ExitCode::FAILURE;
    }
    info!(agency = config.agency_id, server = %config.server_address, "agency-client bootstrap");

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(config)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "agency-client failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig) -> Result<()> {
    let source = CsvRecordSource::open(config.data_path()).await?;

    // ── Shutdown wiring ─────────────────────────────────
    let ct = CancellationToken::new();
    let coordinator = ShutdownCoordinator::new(ct.clone());
    let (signal_tx, signal_rx) = signal_channel();
    let listener_handle = coordinator.spawn_listener(signal_rx);
    let signals_handle = forward_os_signals(signal_tx, ct.clone());

    // ── Session ─────────────────────────────────────────
    let outcome = SessionLoop::new(&config, source, Arc::clone(&coordinator))
        .run()
        .await;

    // Normal completion wins the race against any late signal.
    coordinator.cancel();
    let _ = tokio::join!(listener_handle, signals_handle);

    if let Some(signal) = coordinator.fired_signal() {
        info!(%signal, "shut down by signal");
    }

    let report = outcome?;
    if let Some(winners) = &report.winners {
        info!(
            winners = winners.len(),
            accepted = report.accepted,
            rejected = report.rejected,
            "session complete"
        );
    }
    info!("agency-client shut down");

    Ok(())
}

fn load_config(args: &Cli) -> Result<ClientConfig> {
    let config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::from_env()?,
    };

    match args.agency {
        Some(agency) => config.with_agency(agency),
        None => Ok(config),
    }
}

fn init_tracing(log_format: LogFormat, default_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
