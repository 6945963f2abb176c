//! Launcher that records every launch attempt before delegating to the OS

use ib_bootstrap::error::Result;
use ib_bootstrap::{LaunchSpec, Launcher, ManagedProcess, ProcessRole, SystemLauncher};
use std::sync::{Arc, Mutex};

/// Wraps [`SystemLauncher`] and keeps the order in which launches were
/// requested, including ones that then failed to spawn.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<LaunchSpec>>>,
    inner: SystemLauncher,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(&self) -> Vec<ProcessRole> {
        self.launches.lock().unwrap().iter().map(|s| s.role).collect()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ManagedProcess> {
        self.launches.lock().unwrap().push(spec.clone());
        self.inner.launch(spec)
    }
}
