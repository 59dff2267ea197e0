// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use mount_contracts::CommandRunner;
use mount_types::{
    AccessInfo, AccessMode, ActiveMount, DriveLetter, FailedStep, UnmountAndUnmapResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::policy;
use super::{CANCELLED_MESSAGE, unmount_command};
use crate::access::AccessSurfaceService;
use crate::state::MountStateStore;

/// Arguments of `UnmountAndUnmap`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmountRequest {
    pub disk_index: u32,
    pub drive_letter: Option<char>,
    pub surface_name: Option<String>,
}

impl UnmountRequest {
    pub fn new(disk_index: u32) -> Self {
        Self {
            disk_index,
            ..Self::default()
        }
    }

    pub fn with_drive_letter(mut self, letter: char) -> Self {
        self.drive_letter = Some(letter);
        self
    }

    pub fn with_surface_name(mut self, name: impl Into<String>) -> Self {
        self.surface_name = Some(name.into());
        self
    }
}

pub struct UnmountOrchestrator {
    runner: Arc<dyn CommandRunner>,
    access: Arc<AccessSurfaceService>,
    store: Arc<MountStateStore>,
}

impl UnmountOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        access: Arc<AccessSurfaceService>,
        store: Arc<MountStateStore>,
    ) -> Self {
        Self {
            runner,
            access,
            store,
        }
    }

    /// Remove access surfaces, then detach the disk
    ///
    /// Surface removal failures never stop the unmount. They still fail the
    /// overall result with step `unmap` once the disk is detached.
    pub async fn unmount_and_unmap(
        &self,
        request: &UnmountRequest,
        cancel: &CancellationToken,
    ) -> UnmountAndUnmapResult {
        let disk_index = request.disk_index;
        info!("Unmount requested for disk {}", disk_index);

        let letter = match request.drive_letter {
            Some(c) => match DriveLetter::new(c) {
                Some(letter) => Some(letter),
                None => {
                    return self.finish(
                        request,
                        UnmountAndUnmapResult::failure(
                            disk_index,
                            FailedStep::Validation,
                            format!("'{}' is not a valid drive letter", c),
                        ),
                    );
                }
            },
            None => None,
        };

        let mut warnings = Vec::new();
        let surfaces = self
            .surfaces_to_remove(request, letter, &mut warnings)
            .await;

        // Step 1: access surfaces
        let mut unmap_errors = Vec::new();
        for surface in &surfaces {
            if let Err(failure) = self.access.remove_access(surface, cancel).await {
                warn!("Could not remove {} surface: {}", surface.mode, failure.message);
                unmap_errors.push(failure.message);
            }
        }

        // Step 2: detach
        if cancel.is_cancelled() {
            return self.finish(
                request,
                UnmountAndUnmapResult::failure(disk_index, FailedStep::Unmount, CANCELLED_MESSAGE),
            );
        }
        let unmounted = match self.runner.run(unmount_command(disk_index), cancel).await {
            Ok(response) if response.is_ok() => Ok(()),
            Ok(response) if policy::is_already_detached(&response) => {
                info!("Disk {} was already detached", disk_index);
                Ok(())
            }
            Ok(response) => Err(response.display_error()),
            Err(e) if e.is_cancelled() => Err(CANCELLED_MESSAGE.to_string()),
            Err(e) => Err(e.message),
        };

        let mut result = match unmounted {
            Err(message) => {
                error!("Unmount of disk {} failed: {}", disk_index, message);
                let mut result =
                    UnmountAndUnmapResult::failure(disk_index, FailedStep::Unmount, message);
                result.warnings.extend(unmap_errors);
                result
            }
            Ok(()) => {
                // The detach is per disk, so every record for it is stale now.
                if let Err(e) = self.store.unregister(disk_index, None).await {
                    warn!("Disk {} unmounted but its records remain: {}", disk_index, e);
                    warnings.push(format!("Could not clear mount records: {}", e));
                }

                if unmap_errors.is_empty() {
                    info!("Unmounted disk {}", disk_index);
                    UnmountAndUnmapResult::success(disk_index)
                } else {
                    let mut result = UnmountAndUnmapResult::failure(
                        disk_index,
                        FailedStep::Unmap,
                        format!(
                            "Disk was unmounted but its access surface could not be removed: {}",
                            unmap_errors.join("; ")
                        ),
                    );
                    result.unmounted = true;
                    result
                }
            }
        };

        result.warnings.extend(warnings);
        if letter.is_none() && request.surface_name.is_none() {
            result.drive_letter = surfaces.iter().find_map(|s| s.drive_letter);
            result.surface_name = surfaces.iter().find_map(|s| s.surface_name.clone());
        }
        self.finish(request, result)
    }

    /// Explicit references first, then every other surface recorded for the disk
    ///
    /// The detach takes the whole disk down, so a recorded surface left
    /// behind would point at a dead share with no record of it.
    async fn surfaces_to_remove(
        &self,
        request: &UnmountRequest,
        letter: Option<DriveLetter>,
        warnings: &mut Vec<String>,
    ) -> Vec<AccessInfo> {
        let recorded = match self.store.get_by_disk(request.disk_index).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read mount state: {}", e);
                warnings.push(format!("Could not read mount state: {}", e));
                Vec::new()
            }
        };
        let is_explicit = |record: &ActiveMount| {
            letter.is_some_and(|letter| record.bound_letter() == Some(letter))
                || request.surface_name.as_deref().is_some_and(|name| {
                    record
                        .bound_surface_name()
                        .is_some_and(|bound| bound.eq_ignore_ascii_case(name))
                })
        };

        let mut surfaces = Vec::new();
        if let Some(letter) = letter {
            let share = recorded_share(&recorded, |record| record.bound_letter() == Some(letter));
            surfaces.push(AccessInfo::drive_letter(share, letter));
        }
        if let Some(name) = &request.surface_name {
            let share = recorded_share(&recorded, |record| {
                record
                    .bound_surface_name()
                    .is_some_and(|bound| bound.eq_ignore_ascii_case(name))
            });
            surfaces.push(AccessInfo::network_location(share, name.clone()));
        }

        surfaces.extend(
            recorded
                .iter()
                .filter(|record| record.access_mode != AccessMode::None && !is_explicit(record))
                .map(|record| AccessInfo {
                    mode: record.access_mode,
                    share_path: record.external_path.clone().unwrap_or_default(),
                    drive_letter: record.bound_letter(),
                    surface_name: record.bound_surface_name().map(str::to_string),
                }),
        );
        surfaces
    }

    fn finish(
        &self,
        request: &UnmountRequest,
        mut result: UnmountAndUnmapResult,
    ) -> UnmountAndUnmapResult {
        if let Some(letter) = request.drive_letter.and_then(DriveLetter::new) {
            result.drive_letter = Some(letter);
        }
        if request.surface_name.is_some() {
            result.surface_name = request.surface_name.clone();
        }
        result
    }
}

fn recorded_share(recorded: &[ActiveMount], matches: impl Fn(&ActiveMount) -> bool) -> String {
    recorded
        .iter()
        .find(|record| matches(record))
        .and_then(|record| record.external_path.clone())
        .unwrap_or_default()
}
