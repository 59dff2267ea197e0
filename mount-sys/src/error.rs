// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::time::Duration;

use mount_contracts::{BridgeError, BridgeErrorKind};
use thiserror::Error;

/// Error types for host-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No script host found (tried powershell.exe and pwsh)")]
    ScriptHostNotFound,

    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Command timed out after {0:?}: {1}")]
    Timeout(Duration, String),

    #[error("Command cancelled: {0}")]
    Cancelled(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<SysError> for BridgeError {
    fn from(err: SysError) -> Self {
        let kind = match &err {
            SysError::Timeout(..) => BridgeErrorKind::Timeout,
            SysError::Cancelled(_) => BridgeErrorKind::Cancelled,
            SysError::ScriptHostNotFound => BridgeErrorKind::Unavailable,
            SysError::ScriptNotFound(_) => BridgeErrorKind::NotFound,
            SysError::Io(_) | SysError::OperationFailed(_) => BridgeErrorKind::CommandFailed,
        };
        BridgeError::new(kind, err.to_string())
    }
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, SysError>;
