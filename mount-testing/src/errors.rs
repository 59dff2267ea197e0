// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("skipped: {reason}")]
    TestSkipped { reason: String },
    #[error("failed: {reason}")]
    TestFailed { reason: String },
    #[error("no harness case named '{id}'")]
    UnknownCase { id: String },
    #[error(transparent)]
    Service(#[from] mount_service::ServiceError),
}

pub type Result<T> = std::result::Result<T, TestingError>;
