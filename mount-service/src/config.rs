// SPDX-License-Identifier: GPL-3.0-only

//! Bridge configuration, read from a TOML file
//!
//! Every field is optional; a missing file yields [`BridgeConfig::default`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

pub const CONFIG_ENV: &str = "WSL_DISK_BRIDGE_CONFIG";
const APP_DIR: &str = "wsl-disk-bridge";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Program and leading arguments used to run the bridge scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHostConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub file_flag: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "ps1".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub state_file: Option<PathBuf>,
    pub scripts_dir: Option<PathBuf>,
    pub script_host: Option<ScriptHostConfig>,
    pub default_distribution: Option<String>,
    pub verify_attempts: u32,
    pub verify_base_delay_ms: u64,
    pub probe_timeout_ms: u64,
    pub rollback_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub elevated_poll_interval_ms: u64,
    pub reconcile_probe_timeout_ms: u64,
    pub log_level: LoggingLevel,
    pub log_to_disk: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            scripts_dir: None,
            script_host: None,
            default_distribution: None,
            verify_attempts: 5,
            verify_base_delay_ms: 500,
            probe_timeout_ms: 3_000,
            rollback_timeout_secs: 30,
            command_timeout_secs: 120,
            elevated_poll_interval_ms: 250,
            reconcile_probe_timeout_ms: 2_000,
            log_level: LoggingLevel::Info,
            log_to_disk: true,
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, else `$WSL_DISK_BRIDGE_CONFIG`, else the platform config dir
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).map_err(|error| ServiceError::Config {
            path: path.clone(),
            reason: error.to_string(),
        })?;
        Self::from_toml(&raw, &path)
    }

    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|error| ServiceError::Config {
            path: origin.to_path_buf(),
            reason: error.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    pub fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |reason: &str| {
            Err(ServiceError::Config {
                path: origin.to_path_buf(),
                reason: reason.to_string(),
            })
        };

        if self.verify_attempts == 0 {
            return invalid("verify_attempts must be at least 1");
        }
        if self.probe_timeout_ms == 0 || self.reconcile_probe_timeout_ms == 0 {
            return invalid("probe timeouts must be greater than zero");
        }
        if self.rollback_timeout_secs == 0 || self.command_timeout_secs == 0 {
            return invalid("command and rollback timeouts must be greater than zero");
        }
        if self.elevated_poll_interval_ms == 0 {
            return invalid("elevated_poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| data_dir().join("active-mounts.json"))
    }

    /// Scripts ship next to the executable unless configured otherwise
    pub fn scripts_dir(&self) -> PathBuf {
        if let Some(dir) = &self.scripts_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("scripts")))
            .unwrap_or_else(|| PathBuf::from("scripts"))
    }

    pub fn verify_base_delay(&self) -> Duration {
        Duration::from_millis(self.verify_base_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_secs(self.rollback_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn elevated_poll_interval(&self) -> Duration {
        Duration::from_millis(self.elevated_poll_interval_ms)
    }

    pub fn reconcile_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile_probe_timeout_ms)
    }
}

fn config_dir() -> PathBuf {
    if let Some(appdata) = std::env::var_os("APPDATA") {
        return PathBuf::from(appdata).join(APP_DIR);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP_DIR);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR);
    }
    PathBuf::from(".").join(APP_DIR)
}

pub(crate) fn data_dir() -> PathBuf {
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        return PathBuf::from(local).join(APP_DIR);
    }
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join(APP_DIR);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("state").join(APP_DIR);
    }
    std::env::temp_dir().join(APP_DIR)
}
