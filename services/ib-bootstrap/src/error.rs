//! Bootstrap error taxonomy and exit-code mapping

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::process::{ExitOutcome, ProcessRole};

/// Exit code for configuration errors (sysexits `EX_CONFIG`)
pub const EXIT_CONFIG: u8 = 78;

/// Exit code when an executable cannot be launched (shell convention)
pub const EXIT_LAUNCH: u8 = 127;

/// Exit code when the gateway never becomes reachable (sysexits `EX_UNAVAILABLE`)
pub const EXIT_GATEWAY_UNAVAILABLE: u8 = 69;

/// Exit code for internal failures (sysexits `EX_SOFTWARE`)
pub const EXIT_INTERNAL: u8 = 70;

/// Errors that abort the bootstrap sequence
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },

    #[error("failed to write gateway config {}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read gateway config {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode gateway config")]
    ConfigEncode(#[from] serde_json::Error),

    #[error("failed to launch {role} ({program})")]
    Launch {
        role: ProcessRole,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("gateway not ready on {addr} after {}", human_duration(.waited))]
    GatewayNotReady { addr: String, waited: Duration },

    #[error("gateway exited before becoming ready ({outcome})")]
    GatewayExited { outcome: ExitOutcome },

    #[error("failed waiting on {role}")]
    Wait {
        role: ProcessRole,
        #[source]
        source: io::Error,
    },
}

impl BootstrapError {
    /// Process exit code the supervisor should terminate with
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingEnv(_)
            | Self::InvalidEnv { .. }
            | Self::ConfigWrite { .. }
            | Self::ConfigRead { .. }
            | Self::ConfigEncode(_) => EXIT_CONFIG,
            Self::Launch { .. } => EXIT_LAUNCH,
            Self::GatewayNotReady { .. } | Self::GatewayExited { .. } => EXIT_GATEWAY_UNAVAILABLE,
            Self::Wait { .. } => EXIT_INTERNAL,
        }
    }

    /// True for errors raised before any child process was started
    pub fn is_configuration(&self) -> bool {
        self.exit_code() == EXIT_CONFIG
    }
}

fn human_duration(d: &Duration) -> String {
    if d.as_secs() >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
