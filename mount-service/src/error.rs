// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use mount_contracts::{BridgeError, BridgeErrorKind};
use thiserror::Error;

/// Service-specific errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid configuration in {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("State file {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Host error: {0}")]
    Host(#[from] mount_sys::SysError),

    #[error("{0}")]
    Bridge(#[from] BridgeError),
}

impl From<ServiceError> for BridgeError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Bridge(inner) => inner,
            ServiceError::Host(inner) => inner.into(),
            ServiceError::Conflict(msg) => BridgeError::new(BridgeErrorKind::Conflict, msg),
            ServiceError::Config { .. } => {
                BridgeError::new(BridgeErrorKind::InvalidInput, err.to_string())
            }
            ServiceError::Persistence { .. } => {
                BridgeError::new(BridgeErrorKind::Persistence, err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
