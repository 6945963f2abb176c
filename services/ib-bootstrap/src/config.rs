//! Bootstrap configuration
//!
//! Everything is read from the process environment. Only the two credential
//! variables are required; the rest have defaults suitable for a single
//! container running the gateway next to one strategy.

use std::env::VarError;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::{Credential, PASSWORD_ENV, USER_ENV};
use crate::error::{BootstrapError, Result};
use crate::process::{LaunchSpec, ProcessRole};

/// Placeholder in `IB_GATEWAY_ARGS` replaced by the config artifact path
pub const CONFIG_PLACEHOLDER: &str = "{config}";

const DEFAULT_CONFIG_SUBDIR: &str = "Jts/ibgateway";
const DEFAULT_GATEWAY_VERSION: &str = "1019";
const DEFAULT_GATEWAY_BIN: &str = "/opt/ibgateway/ibgateway";
const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";
/// Live-trading API port the strategy connects to
const DEFAULT_GATEWAY_PORT: u16 = 7001;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 120;
const DEFAULT_READY_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_STRATEGY_BIN: &str = "python3";

/// Full runtime configuration for one bootstrap run
#[derive(Debug)]
pub struct Settings {
    pub credential: Credential,
    pub gateway: GatewaySettings,
    pub readiness: ReadinessSettings,
    /// Interpreter or executable the forwarded arguments are passed to
    pub strategy_bin: OsString,
}

/// Where the gateway lives and how it is started
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub config_root: PathBuf,
    pub version: String,
    pub bin: PathBuf,
    pub args: Vec<String>,
}

/// How the supervisor decides the gateway is accepting API clients
#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    pub host: String,
    pub port: u16,
    /// Overall deadline for the port to open
    pub timeout: Duration,
    /// Pause between connect attempts
    pub interval: Duration,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Extra grace after the port opens
    pub settle: Duration,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::try_from_lookup(env_var)
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::try_from_lookup(|key| Ok(lookup(key)))
    }

    /// Load settings through a lookup that may reject a raw value
    pub fn try_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&'static str) -> Result<Option<String>>,
    {
        let get = |key: &'static str| -> Result<Option<String>> {
            Ok(lookup(key)?.filter(|v| !v.is_empty()))
        };

        let username = get(USER_ENV)?.ok_or(BootstrapError::MissingEnv(USER_ENV))?;
        let password = get(PASSWORD_ENV)?.ok_or(BootstrapError::MissingEnv(PASSWORD_ENV))?;

        let config_root = get("IB_GATEWAY_CONFIG_ROOT")?
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/root"))
                    .join(DEFAULT_CONFIG_SUBDIR)
            });

        let args = get("IB_GATEWAY_ARGS")?
            .unwrap_or_else(|| CONFIG_PLACEHOLDER.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let gateway = GatewaySettings {
            config_root,
            version: get("IB_GATEWAY_VERSION")?
                .unwrap_or_else(|| DEFAULT_GATEWAY_VERSION.to_string()),
            bin: get("IB_GATEWAY_BIN")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GATEWAY_BIN)),
            args,
        };

        let readiness = ReadinessSettings {
            host: get("IB_GATEWAY_HOST")?.unwrap_or_else(|| DEFAULT_GATEWAY_HOST.to_string()),
            port: parse_or(&get, "IB_GATEWAY_PORT", DEFAULT_GATEWAY_PORT)?,
            timeout: Duration::from_secs(parse_or(
                &get,
                "IB_GATEWAY_READY_TIMEOUT_SECS",
                DEFAULT_READY_TIMEOUT_SECS,
            )?),
            interval: Duration::from_millis(parse_or(
                &get,
                "IB_GATEWAY_READY_INTERVAL_MS",
                DEFAULT_READY_INTERVAL_MS,
            )?),
            connect_timeout: Duration::from_millis(parse_or(
                &get,
                "IB_GATEWAY_CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_TIMEOUT_MS,
            )?),
            settle: Duration::from_secs(parse_or(&get, "IB_GATEWAY_SETTLE_SECS", 0)?),
        };

        let strategy_bin = get("STRATEGY_BIN")?
            .unwrap_or_else(|| DEFAULT_STRATEGY_BIN.to_string())
            .into();

        Ok(Self {
            credential: Credential::new(username, password),
            gateway,
            readiness,
            strategy_bin,
        })
    }
}

impl GatewaySettings {
    /// Versioned directory holding the config artifact
    pub fn config_dir(&self) -> PathBuf {
        self.config_root.join(&self.version)
    }

    /// Gateway launch command with `{config}` expanded to `config_path`
    pub fn launch_spec(&self, config_path: &Path) -> LaunchSpec {
        let args = self
            .args
            .iter()
            .map(|arg| {
                if arg == CONFIG_PLACEHOLDER {
                    config_path.as_os_str().to_owned()
                } else {
                    arg.replace(CONFIG_PLACEHOLDER, &config_path.to_string_lossy())
                        .into()
                }
            })
            .collect();

        LaunchSpec::new(ProcessRole::Gateway, self.bin.as_os_str(), args)
    }
}

impl ReadinessSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Process environment lookup; a value that is not UTF-8 is rejected rather
/// than treated as unset
fn env_var(key: &'static str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(BootstrapError::InvalidEnv {
            key,
            reason: "value is not valid UTF-8".to_string(),
        }),
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&'static str) -> Result<Option<String>>,
{
    match get(key)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| BootstrapError::InvalidEnv {
                key,
                reason: format!("{:?}: {}", raw, e),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![("IBKR_USER", "trader1"), ("IBKR_PASSWORD", "s3cret")]
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&base())).unwrap();

        assert_eq!(settings.credential.username(), "trader1");
        assert!(settings.gateway.config_root.ends_with("Jts/ibgateway"));
        assert_eq!(settings.gateway.version, "1019");
        assert_eq!(settings.gateway.bin, PathBuf::from(DEFAULT_GATEWAY_BIN));
        assert_eq!(settings.gateway.args, vec!["{config}".to_string()]);
        assert_eq!(settings.readiness.address(), "127.0.0.1:7001");
        assert_eq!(settings.readiness.timeout, Duration::from_secs(120));
        assert_eq!(settings.readiness.interval, Duration::from_secs(1));
        assert_eq!(settings.readiness.settle, Duration::ZERO);
        assert_eq!(settings.strategy_bin, OsString::from("python3"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = Settings::from_lookup(lookup(&[("IBKR_PASSWORD", "s3cret")])).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingEnv("IBKR_USER")));

        let err = Settings::from_lookup(lookup(&[("IBKR_USER", "trader1")])).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingEnv("IBKR_PASSWORD")));
    }

    #[test]
    fn test_empty_credential_is_missing() {
        let err = Settings::from_lookup(lookup(&[("IBKR_USER", ""), ("IBKR_PASSWORD", "x")]))
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingEnv("IBKR_USER")));
        assert!(err.is_configuration());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_env_is_invalid_not_missing() {
        use std::os::unix::ffi::OsStrExt;

        const KEY: &str = "IB_BOOTSTRAP_TEST_NON_UTF8";
        std::env::set_var(KEY, std::ffi::OsStr::from_bytes(b"tr\xffder"));
        let err = env_var(KEY).unwrap_err();
        std::env::remove_var(KEY);

        match err {
            BootstrapError::InvalidEnv { key, reason } => {
                assert_eq!(key, KEY);
                assert_eq!(reason, "value is not valid UTF-8");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(env_var("IB_BOOTSTRAP_TEST_UNSET").unwrap(), None);
    }

    #[test]
    fn test_lookup_rejection_propagates() {
        let err = Settings::try_from_lookup(|key| match key {
            "IBKR_USER" => Err(BootstrapError::InvalidEnv {
                key,
                reason: "value is not valid UTF-8".to_string(),
            }),
            _ => Ok(Some("x".to_string())),
        })
        .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidEnv { key: "IBKR_USER", .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let mut pairs = base();
        pairs.push(("IB_GATEWAY_PORT", "seventy"));
        let err = Settings::from_lookup(lookup(&pairs)).unwrap_err();
        match err {
            BootstrapError::InvalidEnv { key, .. } => assert_eq!(key, "IB_GATEWAY_PORT"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overrides() {
        let mut pairs = base();
        pairs.extend([
            ("IB_GATEWAY_CONFIG_ROOT", "/srv/gw"),
            ("IB_GATEWAY_VERSION", "1030"),
            ("IB_GATEWAY_PORT", "4002"),
            ("IB_GATEWAY_READY_TIMEOUT_SECS", "30"),
            ("IB_GATEWAY_SETTLE_SECS", "5"),
            ("STRATEGY_BIN", "/usr/local/bin/strategy"),
        ]);
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(settings.gateway.config_dir(), PathBuf::from("/srv/gw/1030"));
        assert_eq!(settings.readiness.port, 4002);
        assert_eq!(settings.readiness.timeout, Duration::from_secs(30));
        assert_eq!(settings.readiness.settle, Duration::from_secs(5));
        assert_eq!(settings.strategy_bin, OsString::from("/usr/local/bin/strategy"));
    }

    #[test]
    fn test_gateway_args_expand_config_path() {
        let mut pairs = base();
        pairs.push(("IB_GATEWAY_ARGS", "--mode=headless --config={config} {config}"));
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();

        let spec = settings
            .gateway
            .launch_spec(Path::new("/srv/gw/1019/config.json"));
        assert_eq!(spec.role, ProcessRole::Gateway);
        assert_eq!(
            spec.args,
            vec![
                OsString::from("--mode=headless"),
                OsString::from("--config=/srv/gw/1019/config.json"),
                OsString::from("/srv/gw/1019/config.json"),
            ]
        );
    }
}
