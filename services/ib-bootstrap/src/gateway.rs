//! Headless gateway handle
//!
//! Wraps the background gateway process so the supervisor can probe its API
//! port for readiness and tell "never came up" apart from "died later".

use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ReadinessSettings;
use crate::error::{BootstrapError, Result};
use crate::process::{ExitOutcome, ManagedProcess, ProcessRole};

/// Liveness of the background gateway at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayLiveness {
    Running,
    Exited(ExitOutcome),
}

/// Retained handle on the launched gateway
#[derive(Debug)]
pub struct GatewayProcess {
    process: ManagedProcess,
    ready_at: Option<DateTime<Utc>>,
}

impl GatewayProcess {
    pub fn new(process: ManagedProcess) -> Self {
        Self {
            process,
            ready_at: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.process.started_at()
    }

    /// When the API port first accepted a connection, if it has
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    /// Non-blocking liveness check
    pub fn liveness(&mut self) -> Result<GatewayLiveness> {
        let outcome = self
            .process
            .try_outcome()
            .map_err(|source| BootstrapError::Wait {
                role: ProcessRole::Gateway,
                source,
            })?;

        Ok(match outcome {
            Some(outcome) => GatewayLiveness::Exited(outcome),
            None => GatewayLiveness::Running,
        })
    }

    /// Poll the gateway's API port until it accepts a TCP connection.
    ///
    /// Fails with `GatewayExited` as soon as the process is seen to have
    /// exited, or with `GatewayNotReady` once `readiness.timeout` elapses.
    /// After the port opens, sleeps `readiness.settle` before returning.
    pub async fn wait_until_ready(&mut self, readiness: &ReadinessSettings) -> Result<()> {
        let addr = readiness.address();
        let start = Instant::now();
        let deadline = start + readiness.timeout;
        let mut attempts: u32 = 0;

        info!(
            "Waiting up to {}s for gateway API on {}",
            readiness.timeout.as_secs(),
            addr
        );

        loop {
            if let GatewayLiveness::Exited(outcome) = self.liveness()? {
                warn!("Gateway exited during startup ({})", outcome);
                return Err(BootstrapError::GatewayExited { outcome });
            }

            attempts += 1;
            let budget = readiness
                .connect_timeout
                .min(deadline.saturating_duration_since(Instant::now()));

            match timeout(budget, TcpStream::connect(addr.as_str())).await {
                Ok(Ok(_stream)) => break,
                Ok(Err(e)) => debug!("Gateway probe #{} on {}: {}", attempts, addr, e),
                Err(_) => debug!("Gateway probe #{} on {} timed out", attempts, addr),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BootstrapError::GatewayNotReady {
                    addr,
                    waited: now - start,
                });
            }
            sleep(readiness.interval.min(deadline - now)).await;
        }

        self.ready_at = Some(Utc::now());
        info!(
            "Gateway API reachable on {} after {:?} ({} probes)",
            addr,
            start.elapsed(),
            attempts
        );

        if !readiness.settle.is_zero() {
            debug!("Settling for {:?} before starting strategy", readiness.settle);
            sleep(readiness.settle).await;
        }

        Ok(())
    }
}
