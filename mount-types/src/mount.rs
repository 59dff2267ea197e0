// SPDX-License-Identifier: GPL-3.0-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{AccessMode, DriveLetter};

/// Identity of a mount: one record per (disk, partition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MountKey {
    pub disk_index: u32,
    pub partition: u32,
}

impl MountKey {
    pub fn new(disk_index: u32, partition: u32) -> Self {
        Self {
            disk_index,
            partition,
        }
    }
}

impl std::fmt::Display for MountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "disk {} partition {}", self.disk_index, self.partition)
    }
}

/// Durable record of one believed-active mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMount {
    pub id: Uuid,
    pub disk_index: u32,
    pub partition: u32,
    pub access_mode: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_letter: Option<DriveLetter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_name: Option<String>,
    pub distribution: String,
    pub internal_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_path: Option<String>,
    pub mounted_at: DateTime<Utc>,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

impl ActiveMount {
    /// Fresh, verified record stamped with the current time
    pub fn new(
        key: MountKey,
        access_mode: AccessMode,
        distribution: impl Into<String>,
        internal_path: impl Into<String>,
        external_path: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            disk_index: key.disk_index,
            partition: key.partition,
            access_mode,
            drive_letter: None,
            surface_name: None,
            distribution: distribution.into(),
            internal_path: internal_path.into(),
            external_path,
            mounted_at: now,
            verified: true,
            last_verified: Some(now),
        }
    }

    pub fn with_drive_letter(mut self, letter: Option<DriveLetter>) -> Self {
        self.drive_letter = letter;
        self
    }

    pub fn with_surface_name(mut self, name: Option<String>) -> Self {
        self.surface_name = name;
        self
    }

    pub fn key(&self) -> MountKey {
        MountKey::new(self.disk_index, self.partition)
    }

    /// Letter binding that must be unique across records
    pub fn bound_letter(&self) -> Option<DriveLetter> {
        match self.access_mode {
            AccessMode::DriveLetterLegacy => self.drive_letter,
            _ => None,
        }
    }

    /// Surface name binding that must be unique across records
    pub fn bound_surface_name(&self) -> Option<&str> {
        match self.access_mode {
            AccessMode::NetworkLocation => self.surface_name.as_deref(),
            _ => None,
        }
    }

    pub fn has_external_path(&self) -> bool {
        self.external_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_follow_access_mode() {
        let letter = DriveLetter::new('X');
        let record = ActiveMount::new(
            MountKey::new(1, 2),
            AccessMode::NetworkLocation,
            "Ubuntu",
            "/mnt/wsl/PHYSICALDRIVE1p2",
            Some("\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE1p2".to_string()),
        )
        .with_drive_letter(letter)
        .with_surface_name(Some("Data".to_string()));

        assert_eq!(record.bound_letter(), None);
        assert_eq!(record.bound_surface_name(), Some("Data"));
        assert!(record.verified);
        assert_eq!(record.key(), MountKey::new(1, 2));
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = ActiveMount::new(
            MountKey::new(3, 1),
            AccessMode::DriveLetterLegacy,
            "Debian",
            "/mnt/wsl/PHYSICALDRIVE3p1",
            None,
        )
        .with_drive_letter(DriveLetter::new('z'));
        let json = serde_json::to_string(&record).expect("serialize record");
        let parsed: ActiveMount = serde_json::from_str(&json).expect("deserialize record");
        assert_eq!(parsed, record);
        assert!(!parsed.has_external_path());
    }
}
