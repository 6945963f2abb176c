//! Bootstrap supervisor - gateway first, then the strategy

use std::ffi::OsString;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use nix::sys::signal::Signal;
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal as UnixSignal, SignalKind};

use crate::config::Settings;
use crate::error::{BootstrapError, Result};
use crate::gateway::{GatewayLiveness, GatewayProcess};
use crate::gateway_config::write_gateway_config;
use crate::process::{
    ExitOutcome, LaunchSpec, Launcher, ManagedProcess, ProcessRole, SystemLauncher,
};

/// Result of a run in which the strategy was started and exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub strategy: ExitOutcome,
    /// Gateway state observed right after the strategy exited; `None` if it
    /// could not be determined
    pub gateway: Option<GatewayLiveness>,
    pub gateway_pid: u32,
}

impl BootstrapReport {
    /// Exit code for the supervisor process: the strategy's own
    pub fn exit_code(&self) -> u8 {
        self.strategy.exit_code()
    }
}

/// Runs the config → gateway → readiness → strategy sequence once
pub struct BootstrapSupervisor<L = SystemLauncher> {
    settings: Settings,
    launcher: L,
}

impl BootstrapSupervisor<SystemLauncher> {
    pub fn new(settings: Settings) -> Self {
        Self::with_launcher(settings, SystemLauncher)
    }
}

impl<L: Launcher> BootstrapSupervisor<L> {
    pub fn with_launcher(settings: Settings, launcher: L) -> Self {
        Self { settings, launcher }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Execute the bootstrap sequence, forwarding `strategy_args` verbatim.
    ///
    /// Any `Err` means the strategy was never started, except `Wait`, which
    /// means the OS failed to report its exit or refused the signal relay.
    /// No step is retried.
    pub async fn run(&self, strategy_args: Vec<OsString>) -> Result<BootstrapReport> {
        let config_dir = self.settings.gateway.config_dir();
        let config_path = write_gateway_config(&self.settings.credential, &config_dir)?;
        info!(
            "Gateway config for user '{}' written to {}",
            self.settings.credential.username(),
            config_path.display()
        );

        let mut gateway = self.start_gateway(&config_path)?;
        gateway.wait_until_ready(&self.settings.readiness).await?;

        // Installed before the strategy starts so no signal falls in between
        let mut relay = SignalRelay::install().map_err(|source| BootstrapError::Wait {
            role: ProcessRole::Strategy,
            source,
        })?;

        let spec = LaunchSpec::new(
            ProcessRole::Strategy,
            self.settings.strategy_bin.clone(),
            strategy_args,
        );
        let mut strategy = match self.launcher.launch(&spec) {
            Ok(process) => process,
            Err(e) => {
                warn!(
                    "Strategy failed to launch; gateway pid={} left running",
                    gateway.pid()
                );
                return Err(e);
            }
        };

        let outcome = relay
            .wait(&mut strategy)
            .await
            .map_err(|source| BootstrapError::Wait {
                role: ProcessRole::Strategy,
                source,
            })?;

        let gateway_state = match gateway.liveness() {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Could not determine gateway state: {:?}", e);
                None
            }
        };

        log_outcome(outcome, gateway_state, &gateway);

        Ok(BootstrapReport {
            strategy: outcome,
            gateway: gateway_state,
            gateway_pid: gateway.pid(),
        })
    }

    fn start_gateway(&self, config_path: &Path) -> Result<GatewayProcess> {
        let spec = self.settings.gateway.launch_spec(config_path);
        let process = self.launcher.launch(&spec)?;
        Ok(GatewayProcess::new(process))
    }
}

fn log_outcome(
    outcome: ExitOutcome,
    gateway_state: Option<GatewayLiveness>,
    gateway: &GatewayProcess,
) {
    if outcome.success() {
        info!("Strategy finished ({})", outcome);
        return;
    }

    match gateway_state {
        Some(GatewayLiveness::Exited(gw)) => error!(
            "Strategy failed ({}); gateway pid={} started {} died after becoming ready ({})",
            outcome,
            gateway.pid(),
            gateway.started_at().to_rfc3339(),
            gw
        ),
        Some(GatewayLiveness::Running) => {
            warn!("Strategy failed ({}); gateway still running", outcome)
        }
        None => warn!("Strategy failed ({})", outcome),
    }
}

/// Relays SIGTERM/SIGINT to the strategy while it runs, so it can shut down
/// on its own terms and its exit status is still the one propagated.
///
/// SIGINT is not relayed to a strategy in our own process group: a Ctrl-C
/// from the terminal has already reached it.
#[cfg(unix)]
struct SignalRelay {
    terminate: UnixSignal,
    interrupt: UnixSignal,
}

#[cfg(unix)]
impl SignalRelay {
    fn install() -> io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn wait(&mut self, strategy: &mut ManagedProcess) -> io::Result<ExitOutcome> {
        loop {
            let received = tokio::select! {
                outcome = strategy.wait() => return outcome,
                _ = self.terminate.recv() => Signal::SIGTERM,
                _ = self.interrupt.recv() => Signal::SIGINT,
            };

            if received == Signal::SIGINT && strategy.shares_process_group().unwrap_or(false) {
                debug!(
                    "SIGINT already delivered to strategy pid={} via its process group",
                    strategy.pid()
                );
                continue;
            }

            info!("Forwarding {} to strategy pid={}", received, strategy.pid());
            if let Err(e) = strategy.send_signal(received) {
                warn!("Failed to forward {}: {}", received, e);
            }
        }
    }
}

#[cfg(not(unix))]
struct SignalRelay;

#[cfg(not(unix))]
impl SignalRelay {
    fn install() -> io::Result<Self> {
        Ok(Self)
    }

    async fn wait(&mut self, strategy: &mut ManagedProcess) -> io::Result<ExitOutcome> {
        strategy.wait().await
    }
}
