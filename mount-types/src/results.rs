// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::access::{AccessMode, DriveLetter};
use crate::mount::ActiveMount;

/// Workflow step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedStep {
    Validation,
    Mount,
    Map,
    Unmount,
    Unmap,
}

impl FailedStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FailedStep::Validation => "validation",
            FailedStep::Mount => "mount",
            FailedStep::Map => "map",
            FailedStep::Unmount => "unmount",
            FailedStep::Unmap => "unmap",
        }
    }
}

impl std::fmt::Display for FailedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `MountAndMap`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountAndMapResult {
    pub success: bool,
    pub disk_index: u32,
    pub partition: u32,
    pub access_mode: AccessMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_letter: Option<DriveLetter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_path: Option<String>,
    /// True when an existing mount satisfied the request without new side effects
    #[serde(default)]
    pub reused_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<FailedStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MountAndMapResult {
    pub fn failure(
        disk_index: u32,
        partition: u32,
        access_mode: AccessMode,
        step: FailedStep,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            disk_index,
            partition,
            access_mode,
            drive_letter: None,
            surface_name: None,
            distribution: None,
            internal_path: None,
            external_path: None,
            reused_existing: false,
            error_message: Some(message.into()),
            error_code: None,
            failed_step: Some(step),
            warnings: Vec::new(),
        }
    }

    pub fn from_mount(mount: &ActiveMount) -> Self {
        Self {
            success: true,
            disk_index: mount.disk_index,
            partition: mount.partition,
            access_mode: mount.access_mode,
            drive_letter: mount.drive_letter,
            surface_name: mount.surface_name.clone(),
            distribution: Some(mount.distribution.clone()),
            internal_path: Some(mount.internal_path.clone()),
            external_path: mount.external_path.clone(),
            reused_existing: false,
            error_message: None,
            error_code: None,
            failed_step: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Outcome of `UnmountAndUnmap`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmountAndUnmapResult {
    pub success: bool,
    pub disk_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_letter: Option<DriveLetter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_name: Option<String>,
    /// The sandbox-side mount is gone, even if the overall result failed
    pub unmounted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<FailedStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl UnmountAndUnmapResult {
    pub fn success(disk_index: u32) -> Self {
        Self {
            success: true,
            disk_index,
            drive_letter: None,
            surface_name: None,
            unmounted: true,
            error_message: None,
            failed_step: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure(disk_index: u32, step: FailedStep, message: impl Into<String>) -> Self {
        Self {
            success: false,
            disk_index,
            drive_letter: None,
            surface_name: None,
            unmounted: false,
            error_message: Some(message.into()),
            failed_step: Some(step),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_step_serializes_as_identifier() {
        let result = MountAndMapResult::failure(1, 2, AccessMode::None, FailedStep::Validation, "bad");
        let json = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(json["failed_step"], "validation");
        assert_eq!(json["success"], false);
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn step_tags_match_protocol_names() {
        let names: Vec<_> = [
            FailedStep::Validation,
            FailedStep::Mount,
            FailedStep::Map,
            FailedStep::Unmount,
            FailedStep::Unmap,
        ]
        .iter()
        .map(|step| step.to_string())
        .collect();
        assert_eq!(names, ["validation", "mount", "map", "unmount", "unmap"]);
    }
}
