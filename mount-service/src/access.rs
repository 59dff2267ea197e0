// SPDX-License-Identifier: GPL-3.0-only

//! Host-visible access surfaces for a mounted share path

use std::sync::Arc;

use mount_contracts::{BridgeError, CommandRunner};
use mount_types::{
    AccessInfo, AccessMode, AccessRequest, CommandRequest, CommandResponse, DriveLetter,
    FailedStep, sanitize_surface_name,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MAP_DRIVE: &str = "map-drive";
pub const UNMAP_DRIVE: &str = "unmap-drive";
pub const CREATE_NETWORK_LOCATION: &str = "create-network-location";
pub const REMOVE_NETWORK_LOCATION: &str = "remove-network-location";

/// Typed failure from the access surface service, tagged with the step it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessFailure {
    pub step: FailedStep,
    pub message: String,
    pub code: Option<String>,
    pub cancelled: bool,
}

impl AccessFailure {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            step: FailedStep::Validation,
            message: message.into(),
            code: None,
            cancelled: false,
        }
    }

    fn from_response(step: FailedStep, response: &CommandResponse) -> Self {
        Self {
            step,
            message: response.display_error(),
            code: response.error_code().map(str::to_string),
            cancelled: false,
        }
    }

    fn from_error(step: FailedStep, error: BridgeError) -> Self {
        Self {
            step,
            cancelled: error.is_cancelled(),
            message: error.message,
            code: None,
        }
    }
}

impl std::fmt::Display for AccessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.step, self.message)
    }
}

pub struct AccessSurfaceService {
    runner: Arc<dyn CommandRunner>,
}

impl AccessSurfaceService {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Create the surface for `request`
    ///
    /// Creation failures are tagged `map`; bad arguments are tagged `validation`.
    pub async fn create_access(
        &self,
        request: &AccessRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessInfo, AccessFailure> {
        if request.mode == AccessMode::None {
            debug!("Access mode none, exposing {} as-is", request.share_path);
            return Ok(AccessInfo::none(request.share_path.clone()));
        }

        if request.share_path.trim().is_empty() {
            return Err(AccessFailure::validation("No share path to expose"));
        }

        match request.mode {
            AccessMode::DriveLetterLegacy => {
                let letter = request.drive_letter.ok_or_else(|| {
                    AccessFailure::validation("Drive letter mode requires a drive letter")
                })?;
                self.map_drive(letter, &request.share_path, cancel).await
            }
            AccessMode::NetworkLocation => {
                let name = match request.surface_name.as_deref() {
                    Some(requested) => sanitize_surface_name(requested).ok_or_else(|| {
                        AccessFailure::validation(format!(
                            "'{}' is not a usable network location name",
                            requested
                        ))
                    })?,
                    None => sanitize_surface_name(&request.default_surface_name())
                        .unwrap_or_else(|| request.default_surface_name()),
                };
                self.create_network_location(&name, &request.share_path, cancel)
                    .await
            }
            AccessMode::None => Ok(AccessInfo::none(request.share_path.clone())),
        }
    }

    /// Remove a surface previously returned by [`Self::create_access`]
    ///
    /// Removal failures are tagged `unmap`.
    pub async fn remove_access(
        &self,
        access: &AccessInfo,
        cancel: &CancellationToken,
    ) -> Result<(), AccessFailure> {
        let request = match access.mode {
            AccessMode::None => return Ok(()),
            AccessMode::DriveLetterLegacy => {
                let letter = access.drive_letter.ok_or_else(|| {
                    AccessFailure::validation("No drive letter recorded for this mapping")
                })?;
                CommandRequest::new(UNMAP_DRIVE).arg("Letter", letter)
            }
            AccessMode::NetworkLocation => {
                let name = access
                    .surface_name
                    .as_deref()
                    .and_then(sanitize_surface_name)
                    .ok_or_else(|| {
                        AccessFailure::validation("No network location name recorded")
                    })?;
                CommandRequest::new(REMOVE_NETWORK_LOCATION).arg("Name", name)
            }
        };

        let response = self
            .runner
            .run(request, cancel)
            .await
            .map_err(|e| AccessFailure::from_error(FailedStep::Unmap, e))?;
        if !response.is_ok() {
            let failure = AccessFailure::from_response(FailedStep::Unmap, &response);
            warn!("Access surface removal failed: {}", failure.message);
            return Err(failure);
        }

        info!("Removed {} access surface for {}", access.mode, access.share_path);
        Ok(())
    }

    async fn map_drive(
        &self,
        letter: DriveLetter,
        share_path: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessInfo, AccessFailure> {
        let request = CommandRequest::new(MAP_DRIVE)
            .arg("Letter", letter)
            .arg("Target", share_path);
        let response = self
            .runner
            .run(request, cancel)
            .await
            .map_err(|e| AccessFailure::from_error(FailedStep::Map, e))?;
        if !response.is_ok() {
            return Err(AccessFailure::from_response(FailedStep::Map, &response));
        }

        info!("Mapped {} to {}", letter.root(), share_path);
        Ok(AccessInfo::drive_letter(share_path, letter))
    }

    async fn create_network_location(
        &self,
        name: &str,
        share_path: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessInfo, AccessFailure> {
        let request = CommandRequest::new(CREATE_NETWORK_LOCATION)
            .arg("Name", name)
            .arg("Target", share_path);
        let response = self
            .runner
            .run(request, cancel)
            .await
            .map_err(|e| AccessFailure::from_error(FailedStep::Map, e))?;
        if !response.is_ok() {
            return Err(AccessFailure::from_response(FailedStep::Map, &response));
        }

        // The script may have picked a different name if ours was taken.
        let assigned = response.get("Name").unwrap_or(name);
        info!("Created network location '{}' for {}", assigned, share_path);
        Ok(AccessInfo::network_location(share_path, assigned))
    }
}
