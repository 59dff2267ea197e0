// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use mount_types::{DiskInfo, DriveLetter};

use crate::BridgeError;

#[async_trait]
pub trait DiskEnumerator: Send + Sync {
    /// Physical disks eligible for mounting; the boot/system disk is excluded
    async fn list_candidate_disks(&self) -> Result<Vec<DiskInfo>, BridgeError>;
}

#[async_trait]
pub trait DriveLetterProvider: Send + Sync {
    /// Letters the host currently has bound to anything
    async fn list_used_letters(&self) -> Result<Vec<DriveLetter>, BridgeError>;
}
