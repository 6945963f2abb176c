//! Child process launching and exit-status handling

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::info;

use crate::error::{BootstrapError, Result};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{getpgid, getpgrp, Pid};

/// Which of the two supervised programs a process is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    Gateway,
    Strategy,
}

impl ProcessRole {
    /// The gateway always runs detached; the strategy owns the foreground
    pub fn mode(self) -> ProcessMode {
        match self {
            Self::Gateway => ProcessMode::Background,
            Self::Strategy => ProcessMode::Foreground,
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway => f.write_str("gateway"),
            Self::Strategy => f.write_str("strategy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Not awaited; stdin is closed
    Background,
    /// Awaited; inherits stdin/stdout/stderr
    Foreground,
}

/// Everything needed to start one child
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub role: ProcessRole,
    pub mode: ProcessMode,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl LaunchSpec {
    pub fn new(role: ProcessRole, program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self {
            role,
            mode: role.mode(),
            program: program.into(),
            args,
        }
    }

    pub fn program_display(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// How a child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal (unix)
    Signaled(i32),
}

impl ExitOutcome {
    /// Exit code to propagate, using the shell's `128 + signal` convention
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Code(code) => (code & 0xff) as u8,
            Self::Signaled(signal) => (128 + signal).clamp(0, 255) as u8,
        }
    }

    pub fn success(self) -> bool {
        self == Self::Code(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }

        Self::Code(-1)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signaled(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

/// A running child started by a [`Launcher`]
pub struct ManagedProcess {
    role: ProcessRole,
    mode: ProcessMode,
    pid: u32,
    started_at: DateTime<Utc>,
    child: Child,
}

impl ManagedProcess {
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Non-blocking check; `None` while the child is still running
    pub fn try_outcome(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(self.child.try_wait()?.map(ExitOutcome::from))
    }

    /// Wait for the child to exit
    pub async fn wait(&mut self) -> io::Result<ExitOutcome> {
        Ok(self.child.wait().await?.into())
    }

    /// Deliver `signal` to the child. A child that was already reaped is
    /// left alone.
    #[cfg(unix)]
    pub fn send_signal(&self, signal: Signal) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(pid as i32), signal)?;
        Ok(())
    }

    /// Whether the child is in this process's process group, and so already
    /// receives terminal-generated signals such as Ctrl-C directly
    #[cfg(unix)]
    pub fn shares_process_group(&self) -> io::Result<bool> {
        let Some(pid) = self.child.id() else {
            return Ok(false);
        };
        Ok(getpgid(Some(Pid::from_raw(pid as i32)))? == getpgrp())
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("role", &self.role)
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Starts child processes for the supervisor
pub trait Launcher: Send + Sync {
    /// Spawn the process described by `spec`. Fails only if the OS refuses to
    /// start it (missing binary, not executable, ...). What the process does
    /// after it starts is not this call's concern.
    fn launch(&self, spec: &LaunchSpec) -> Result<ManagedProcess>;
}

/// [`Launcher`] backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ManagedProcess> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        match spec.mode {
            ProcessMode::Background => {
                command.stdin(Stdio::null());
            }
            ProcessMode::Foreground => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        let child = command.spawn().map_err(|source| BootstrapError::Launch {
            role: spec.role,
            program: spec.program_display(),
            source,
        })?;

        let process = ManagedProcess {
            role: spec.role,
            mode: spec.mode,
            pid: child.id().unwrap_or_default(),
            started_at: Utc::now(),
            child,
        };

        info!(
            "Launched {} ({}) pid={} mode={:?}",
            process.role,
            spec.program_display(),
            process.pid,
            process.mode
        );

        Ok(process)
    }
}
