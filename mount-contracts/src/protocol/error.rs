// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    CommandFailed,
    Timeout,
    Cancelled,
    Persistence,
    Unavailable,
    Internal,
}

impl BridgeErrorKind {
    /// Process exit code used by the CLI surfaces
    pub fn code(self) -> u8 {
        match self {
            Self::InvalidInput => 2,
            Self::NotFound => 3,
            Self::Conflict => 4,
            Self::CommandFailed => 5,
            Self::Timeout => 6,
            Self::Cancelled => 130,
            Self::Persistence => 7,
            Self::Unavailable => 8,
            Self::Internal => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: BridgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Cancelled, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BridgeErrorKind::Timeout, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == BridgeErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_error_roundtrips() {
        let error = BridgeError::new(BridgeErrorKind::Conflict, "letter Z already bound");
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: BridgeError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
        assert_eq!(parsed.to_string(), "Conflict: letter Z already bound");
    }
}
