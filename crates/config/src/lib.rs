#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration for the otad update agent
//!
//! Precedence, lowest to highest: built-in defaults, optional
//! `otad.toml` config file, `OTAD_*` environment variables, CLI flags
//! (applied by the binary).

mod paths;

pub use paths::InstallPaths;

use otad_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default localhost port for the trigger/poll API
pub const DEFAULT_PORT: u16 = 8580;

/// Default config file consulted when no `--config` flag is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/otad.toml";

/// Default install root when neither config file nor overrides name one
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/device";

/// General agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_port")]
    pub listen_port: u16,
    /// Sibling endpoint receiving progress callbacks; callbacks are
    /// disabled when unset.
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            callback_url: None,
        }
    }
}

/// Update engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Seconds a verified package stays installable
    #[serde(default = "default_trust_window")]
    pub trust_window_secs: u64,
    /// Progress reporting/persistence step, percent of total size
    #[serde(default = "default_progress_step")]
    pub progress_step_percent: u8,
    /// Version directories retained beyond current/previous/factory
    #[serde(default = "default_keep_versions")]
    pub keep_versions: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            trust_window_secs: default_trust_window(),
            progress_step_percent: default_progress_step(),
            keep_versions: default_keep_versions(),
        }
    }
}

/// Service controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Service start order; falls back to manifest module order when empty
    #[serde(default)]
    pub start_order: Vec<String>,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// Health gate for the first service after restart
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            start_order: Vec::new(),
            stop_timeout_secs: default_stop_timeout(),
            start_timeout_secs: default_start_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Deployment constraints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeployConfig {
    /// System directories outside the install root that module `dst`
    /// paths may land in
    #[serde(default)]
    pub allowed_dst_roots: Vec<PathBuf>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_net_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_net_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retries: default_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the on-device install tree (versions/, symlinks, tmp/, logs/)
    pub install_root: PathBuf,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Configuration with defaults for everything but the install root
    #[must_use]
    pub fn with_install_root(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            general: GeneralConfig::default(),
            update: UpdateConfig::default(),
            services: ServicesConfig::default(),
            deploy: DeployConfig::default(),
            network: NetworkConfig::default(),
        }
    }

    /// Load from a toml file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::FileRead {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge `OTAD_*` environment variables over file values.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but unparseable.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(root) = std::env::var("OTAD_INSTALL_ROOT") {
            self.install_root = PathBuf::from(root);
        }
        if let Ok(port) = std::env::var("OTAD_PORT") {
            self.general.listen_port =
                port.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "OTAD_PORT".to_string(),
                    message: format!("not a port number: {port}"),
                })?;
        }
        if let Ok(url) = std::env::var("OTAD_CALLBACK_URL") {
            self.general.callback_url = if url.is_empty() { None } else { Some(url) };
        }
        Ok(())
    }

    /// Sanity-check values that would otherwise fail far from their source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.install_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "install_root".to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }
        if !self.install_root.is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "install_root".to_string(),
                message: "must be an absolute path".to_string(),
            }
            .into());
        }
        if self.update.progress_step_percent == 0 || self.update.progress_step_percent > 100 {
            return Err(ConfigError::InvalidValue {
                field: "update.progress_step_percent".to_string(),
                message: "must be within 1..=100".to_string(),
            }
            .into());
        }
        for root in &self.deploy.allowed_dst_roots {
            if !root.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "deploy.allowed_dst_roots".to_string(),
                    message: format!("{} is not absolute", root.display()),
                }
                .into());
            }
        }
        Ok(())
    }

    /// On-disk layout derived from the install root
    #[must_use]
    pub fn paths(&self) -> InstallPaths {
        InstallPaths::new(&self.install_root)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_trust_window() -> u64 {
    24 * 60 * 60
}

fn default_progress_step() -> u8 {
    5
}

fn default_keep_versions() -> usize {
    3
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_start_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

fn default_net_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}
