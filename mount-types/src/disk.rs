// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::access::DriveLetter;

/// GPT type for a generic Linux filesystem partition
pub const LINUX_FILESYSTEM_GPT_TYPE: &str = "0fc63daf-8483-4772-8e79-3d69d8477de4";

/// Filesystems the host reads natively
const HOST_FILESYSTEMS: [&str; 5] = ["ntfs", "fat", "fat32", "exfat", "refs"];

/// Physical disk as reported by the host device inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskInfo {
    pub index: u32,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub bus_type: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_boot: bool,
    #[serde(default)]
    pub partitions: Vec<PartitionInfo>,
}

impl DiskInfo {
    /// Boot and system disks are never offered for mounting
    pub fn is_candidate(&self) -> bool {
        !self.is_system && !self.is_boot
    }

    pub fn has_likely_linux_partition(&self) -> bool {
        self.partitions.iter().any(PartitionInfo::likely_non_host_filesystem)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionInfo {
    pub number: u32,
    #[serde(default)]
    pub size_bytes: u64,
    /// Filesystem label reported by the host, empty when unreadable
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default)]
    pub gpt_type: Option<String>,
    #[serde(default)]
    pub drive_letter: Option<DriveLetter>,
}

impl PartitionInfo {
    /// Heuristic: the host cannot read this partition, so it probably holds a Linux filesystem
    pub fn likely_non_host_filesystem(&self) -> bool {
        if self
            .gpt_type
            .as_deref()
            .is_some_and(|t| t.trim_matches(['{', '}']).eq_ignore_ascii_case(LINUX_FILESYSTEM_GPT_TYPE))
        {
            return true;
        }

        if self.drive_letter.is_some() {
            return false;
        }

        match self.filesystem.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(fs) => !HOST_FILESYSTEMS
                .iter()
                .any(|known| fs.eq_ignore_ascii_case(known)),
        }
    }
}
