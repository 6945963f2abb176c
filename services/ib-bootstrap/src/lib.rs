//! IB Bootstrap Library
//!
//! Headless gateway bootstrap: renders the gateway login config, starts the
//! gateway in the background, waits for its API port, then runs the trading
//! strategy in the foreground and hands back its exit status.

pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod gateway_config;
pub mod process;
pub mod supervisor;

// Re-export main types for convenience
pub use config::{GatewaySettings, ReadinessSettings, Settings};
pub use credentials::Credential;
pub use error::BootstrapError;
pub use gateway::{GatewayLiveness, GatewayProcess};
pub use gateway_config::{read_gateway_config, write_gateway_config, GatewayConfig};
pub use process::{
    ExitOutcome, LaunchSpec, Launcher, ManagedProcess, ProcessMode, ProcessRole, SystemLauncher,
};
pub use supervisor::{BootstrapReport, BootstrapSupervisor};
