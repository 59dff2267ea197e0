// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use mount_service::{BridgeConfig, ServiceRegistry};

use crate::errors::{Result, TestingError};

pub const DISK_INDEX_ENV: &str = "BRIDGE_TESTING_DISK_INDEX";
pub const PARTITION_ENV: &str = "BRIDGE_TESTING_PARTITION";
pub const FS_TYPE_ENV: &str = "BRIDGE_TESTING_FS_TYPE";
pub const CONFIG_ENV: &str = "BRIDGE_TESTING_CONFIG";
pub const DESTRUCTIVE_ENV: &str = "BRIDGE_TESTING_ENABLE_DESTRUCTIVE";

/// The partition the destructive cases operate on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub disk_index: u32,
    pub partition: u32,
    pub fs_type: String,
}

pub fn skip<T>(reason: impl Into<String>) -> Result<T> {
    Err(TestingError::TestSkipped {
        reason: reason.into(),
    })
}

pub fn failure<T>(reason: impl Into<String>) -> Result<T> {
    Err(TestingError::TestFailed {
        reason: reason.into(),
    })
}

/// Fail the case unless `condition` holds
pub fn ensure(condition: bool, reason: impl Into<String>) -> Result<()> {
    if condition { Ok(()) } else { failure(reason) }
}

pub fn env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn require_env(name: &str) -> Result<String> {
    env(name).ok_or_else(|| TestingError::TestSkipped {
        reason: format!("set {name}"),
    })
}

fn require_number(name: &str) -> Result<u32> {
    let raw = require_env(name)?;
    raw.trim().parse().map_err(|_| TestingError::TestFailed {
        reason: format!("{name}='{raw}' is not a number"),
    })
}

pub fn destructive_enabled() -> bool {
    std::env::var(DESTRUCTIVE_ENV).ok().as_deref() == Some("1")
}

pub fn require_destructive(label: &str) -> Result<()> {
    if destructive_enabled() {
        Ok(())
    } else {
        skip(format!("destructive test disabled for {label}"))
    }
}

pub fn target() -> Result<Target> {
    Ok(Target {
        disk_index: require_number(DISK_INDEX_ENV)?,
        partition: require_number(PARTITION_ENV)?,
        fs_type: env(FS_TYPE_ENV).unwrap_or_else(|| "ext4".to_string()),
    })
}

/// Registry wired against the real host; skips when the host cannot run the scripts
pub fn registry() -> Result<ServiceRegistry> {
    let config_path = env(CONFIG_ENV).map(PathBuf::from);
    let config = BridgeConfig::load(config_path.as_deref())?;
    match ServiceRegistry::build_default(&config) {
        Ok(registry) => Ok(registry),
        Err(error) => skip(format!("bridge unavailable on this host: {error}")),
    }
}
