// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// How a completed mount is exposed to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// A folder shortcut under the user's network locations
    #[default]
    NetworkLocation,
    /// A mapped drive letter pointing at the share path
    DriveLetterLegacy,
    /// No host-visible surface; the share path is returned as-is
    None,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::NetworkLocation => write!(f, "network"),
            AccessMode::DriveLetterLegacy => write!(f, "drive"),
            AccessMode::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "network" | "network_location" | "networklocation" => Ok(AccessMode::NetworkLocation),
            "drive" | "drive_letter" | "driveletter" | "drive_letter_legacy" => {
                Ok(AccessMode::DriveLetterLegacy)
            }
            "none" => Ok(AccessMode::None),
            _ => Err(format!("Invalid access mode: {}", s)),
        }
    }
}

/// A single host drive letter, always stored upper-case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DriveLetter(char);

impl DriveLetter {
    /// Accepts `a`-`z` / `A`-`Z`, anything else is rejected
    pub fn new(letter: char) -> Option<Self> {
        letter
            .is_ascii_alphabetic()
            .then(|| Self(letter.to_ascii_uppercase()))
    }

    pub fn as_char(self) -> char {
        self.0
    }

    /// Root path of the letter on the host, e.g. `Z:\`
    pub fn root(self) -> String {
        format!("{}:\\", self.0)
    }
}

impl std::fmt::Display for DriveLetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DriveLetter {
    type Err = String;

    /// Accepts `Z`, `Z:` and `Z:\`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('\\').trim_end_matches(':');
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => {
                DriveLetter::new(letter).ok_or_else(|| format!("Invalid drive letter: {}", s))
            }
            _ => Err(format!("Invalid drive letter: {}", s)),
        }
    }
}

impl TryFrom<String> for DriveLetter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DriveLetter> for String {
    fn from(value: DriveLetter) -> Self {
        value.0.to_string()
    }
}

/// What the orchestrator asks the access surface service to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub mode: AccessMode,
    /// Host-addressable share path to expose
    pub share_path: String,
    pub disk_index: u32,
    pub partition: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_letter: Option<DriveLetter>,
    /// Desired network location name; derived from disk/partition when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_name: Option<String>,
}

impl AccessRequest {
    pub fn new(mode: AccessMode, share_path: impl Into<String>, disk_index: u32, partition: u32) -> Self {
        Self {
            mode,
            share_path: share_path.into(),
            disk_index,
            partition,
            drive_letter: None,
            surface_name: None,
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

    /// Name used for a network location when the caller did not pick one
    pub fn default_surface_name(&self) -> String {
        format!("Linux Disk {} Partition {}", self.disk_index, self.partition)
    }
}

/// What the access surface service actually applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub mode: AccessMode,
    pub share_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_letter: Option<DriveLetter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_name: Option<String>,
}

impl AccessInfo {
    pub fn none(share_path: impl Into<String>) -> Self {
        Self {
            mode: AccessMode::None,
            share_path: share_path.into(),
            drive_letter: None,
            surface_name: None,
        }
    }

    pub fn drive_letter(share_path: impl Into<String>, letter: DriveLetter) -> Self {
        Self {
            mode: AccessMode::DriveLetterLegacy,
            share_path: share_path.into(),
            drive_letter: Some(letter),
            surface_name: None,
        }
    }

    pub fn network_location(share_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: AccessMode::NetworkLocation,
            share_path: share_path.into(),
            drive_letter: None,
            surface_name: Some(name.into()),
        }
    }
}

const INVALID_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace characters that are not allowed in a host folder name
///
/// Trailing dots and spaces are also stripped since the host shell refuses them.
/// Returns `None` when nothing usable remains.
pub fn sanitize_surface_name(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        None
    } else {
        Some(trimmed.to_string())
    }
}
