//! IB Bootstrap - starts the headless gateway, then the trading strategy
//!
//! 1. Writes the gateway login config from IBKR_USER / IBKR_PASSWORD
//! 2. Launches the gateway in the background
//! 3. Waits for the gateway API port to accept connections
//! 4. Runs the strategy with this process's arguments and exits with its status

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Context;
use ib_bootstrap::error::EXIT_INTERNAL;
use ib_bootstrap::{BootstrapError, BootstrapReport, BootstrapSupervisor, Settings};
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout belongs to the strategy
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting IB bootstrap...");

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    match run(args).await {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            error!("Bootstrap failed: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(args: Vec<OsString>) -> anyhow::Result<BootstrapReport> {
    let settings = Settings::from_env().context("Invalid bootstrap configuration")?;
    let supervisor = BootstrapSupervisor::new(settings);

    let settings = supervisor.settings();
    info!(
        "Gateway: bin={}, config_dir={}, api={}",
        settings.gateway.bin.display(),
        settings.gateway.config_dir().display(),
        settings.readiness.address()
    );

    let span = info_span!("bootstrap", run_id = %Uuid::new_v4());

    supervisor
        .run(args)
        .instrument(span)
        .await
        .context("Bootstrap sequence aborted")
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<BootstrapError>()
        .map(BootstrapError::exit_code)
        .unwrap_or(EXIT_INTERNAL)
}
