//! Gateway config artifact rendering
//!
//! Writes the JSON login file the headless gateway reads once at startup.
//! The write goes through a temp file in the target directory followed by a
//! rename, so the gateway never observes a partially written file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use secrecy::zeroize::Zeroizing;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::credentials::Credential;
use crate::error::{BootstrapError, Result};

/// File name of the artifact inside the versioned config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Only address the gateway accepts API clients from
pub const DEFAULT_TRUSTED_IP: &str = "127.0.0.1";

/// Owner read/write only
#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o600;

/// Decoded form of the config artifact
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub user_name: String,
    pub password: String,
    pub extra_args: String,
    #[serde(rename = "trustedIPs")]
    pub trusted_ips: Vec<String>,
    pub read_only: bool,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("user_name", &self.user_name)
            .field("password", &"[REDACTED]")
            .field("extra_args", &self.extra_args)
            .field("trusted_ips", &self.trusted_ips)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Borrowed view used for serialization so the password is never cloned
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderedConfig<'a> {
    user_name: &'a str,
    password: &'a str,
    extra_args: &'a str,
    #[serde(rename = "trustedIPs")]
    trusted_ips: [&'a str; 1],
    read_only: bool,
}

/// Render the gateway config artifact into `dir`.
///
/// Creates `dir` if needed and replaces any existing artifact. Credentials
/// are written as given; an empty or wrong login is only detected by the
/// gateway itself. Returns the path of the written file.
pub fn write_gateway_config(credential: &Credential, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| BootstrapError::ConfigWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(CONFIG_FILE_NAME);
    let write_err = |source| BootstrapError::ConfigWrite {
        path: path.clone(),
        source,
    };

    let body = Zeroizing::new(credential.with_password(|password| {
        serde_json::to_vec_pretty(&RenderedConfig {
            user_name: credential.username(),
            password,
            extra_args: "",
            trusted_ips: [DEFAULT_TRUSTED_IP],
            read_only: false,
        })
    })?);

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(ARTIFACT_MODE))
            .map_err(write_err)?;
    }

    tmp.write_all(&body).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Decode an artifact previously written by [`write_gateway_config`]
pub fn read_gateway_config(path: &Path) -> Result<GatewayConfig> {
    let raw = Zeroizing::new(fs::read(path).map_err(|source| BootstrapError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?);
    Ok(serde_json::from_slice(&raw)?)
}
