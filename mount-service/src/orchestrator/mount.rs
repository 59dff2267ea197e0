// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;
use std::time::Duration;

use mount_contracts::{CommandRunner, DriveLetterProvider, PathProbe};
use mount_types::{
    AccessMode, AccessRequest, ActiveMount, CommandRequest, DriveLetter, FailedStep,
    MountAndMapResult, MountKey, MountResult, sanitize_surface_name,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::policy::{self, AUTO_FS_TYPE, VerifyOutcome, VerifyPolicy};
use super::{CANCELLED_MESSAGE, MOUNT_DISK, unmount_command};
use crate::access::AccessSurfaceService;
use crate::state::MountStateStore;

/// Arguments of `MountAndMap`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub disk_index: u32,
    pub partition: u32,
    pub access_mode: AccessMode,
    pub drive_letter: Option<char>,
    pub fs_type: String,
    pub distribution: Option<String>,
    /// Network location name; derived from disk/partition when absent
    pub surface_name: Option<String>,
}

impl MountRequest {
    pub fn new(disk_index: u32, partition: u32, access_mode: AccessMode) -> Self {
        Self {
            disk_index,
            partition,
            access_mode,
            drive_letter: None,
            fs_type: "ext4".to_string(),
            distribution: None,
            surface_name: None,
        }
    }

    pub fn with_drive_letter(mut self, letter: char) -> Self {
        self.drive_letter = Some(letter);
        self
    }

    pub fn with_fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.fs_type = fs_type.into();
        self
    }

    pub fn with_distribution(mut self, distribution: impl Into<String>) -> Self {
        self.distribution = Some(distribution.into());
        self
    }

    pub fn with_surface_name(mut self, name: impl Into<String>) -> Self {
        self.surface_name = Some(name.into());
        self
    }

    fn key(&self) -> MountKey {
        MountKey::new(self.disk_index, self.partition)
    }
}

#[derive(Debug, Clone)]
pub struct MountSettings {
    pub verify: VerifyPolicy,
    pub rollback_timeout: Duration,
    pub default_distribution: Option<String>,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            verify: VerifyPolicy {
                attempts: 5,
                base_delay: Duration::from_millis(500),
                probe_timeout: Duration::from_secs(3),
            },
            rollback_timeout: Duration::from_secs(30),
            default_distribution: None,
        }
    }
}

/// Arguments that passed validation
struct Validated {
    letter: Option<DriveLetter>,
    surface_name: Option<String>,
    fs_type: String,
    distribution: Option<String>,
}

/// Why a rollback is or is not allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// This call created the mount
    Created,
    /// The host reported the partition as already mounted
    HostReportedMounted,
    /// A record for the partition existed before this call
    PreviouslyRecorded,
}

pub struct MountOrchestrator {
    runner: Arc<dyn CommandRunner>,
    access: Arc<AccessSurfaceService>,
    store: Arc<MountStateStore>,
    letters: Arc<dyn DriveLetterProvider>,
    probe: Arc<dyn PathProbe>,
    settings: MountSettings,
}

impl MountOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        access: Arc<AccessSurfaceService>,
        store: Arc<MountStateStore>,
        letters: Arc<dyn DriveLetterProvider>,
        probe: Arc<dyn PathProbe>,
        settings: MountSettings,
    ) -> Self {
        Self {
            runner,
            access,
            store,
            letters,
            probe,
            settings,
        }
    }

    /// Mount a partition, wait for its share path, then expose it to the host
    pub async fn mount_and_map(
        &self,
        request: &MountRequest,
        cancel: &CancellationToken,
    ) -> MountAndMapResult {
        let key = request.key();
        info!(
            "Mount requested for {} (fstype {}, access {})",
            key, request.fs_type, request.access_mode
        );

        let args = match self.validate(request) {
            Ok(args) => args,
            Err(message) => {
                warn!("Rejected mount of {}: {}", key, message);
                return self.failure(request, FailedStep::Validation, message);
            }
        };

        let prior = match self.store.get(key).await {
            Ok(prior) => prior,
            Err(e) => {
                error!("Could not read mount state: {}", e);
                return self.failure(
                    request,
                    FailedStep::Validation,
                    format!("Could not read mount state: {}", e),
                );
            }
        };

        if let Some(existing) = &prior
            && Self::satisfies(existing, request, &args)
        {
            info!("{} is already mounted and exposed, reusing it", key);
            let mut result = MountAndMapResult::from_mount(existing);
            result.reused_existing = true;
            return result;
        }

        if let Err(message) = self.check_conflicts(request, &args, prior.as_ref()).await {
            warn!("Rejected mount of {}: {}", key, message);
            return self.failure(request, FailedStep::Validation, message);
        }

        // Step 1: mount
        if cancel.is_cancelled() {
            return self.failure(request, FailedStep::Mount, CANCELLED_MESSAGE);
        }
        let mounted = match self.mount_with_fallback(request, &args, cancel).await {
            Ok(mounted) => mounted,
            Err(result) => return result,
        };

        let ownership = if prior.is_some() {
            Ownership::PreviouslyRecorded
        } else if mounted.already_mounted {
            Ownership::HostReportedMounted
        } else {
            Ownership::Created
        };

        // Step 2: share verification
        let Some(share_path) = mounted
            .external_path
            .clone()
            .filter(|path| !path.trim().is_empty())
        else {
            let message = "Mount reported no share path".to_string();
            return self
                .abort(request, &mounted, ownership, FailedStep::Mount, message, None)
                .await;
        };

        info!("Verifying share path {}", share_path);
        match policy::verify_share(&self.probe, &share_path, self.settings.verify, cancel).await {
            VerifyOutcome::Verified { attempts } => {
                debug!("Share path verified after {} attempt(s)", attempts);
            }
            VerifyOutcome::Exhausted { attempts } => {
                let mut message = format!(
                    "Share path {} did not become reachable after {} attempt(s)",
                    share_path, attempts
                );
                if mounted.share_verified {
                    message.push_str(" although the mount script reported it reachable");
                }
                return self
                    .abort(request, &mounted, ownership, FailedStep::Mount, message, None)
                    .await;
            }
            VerifyOutcome::Cancelled => {
                return self
                    .abort(
                        request,
                        &mounted,
                        ownership,
                        FailedStep::Mount,
                        CANCELLED_MESSAGE.to_string(),
                        None,
                    )
                    .await;
            }
        }

        // Step 3: access surface
        let access_request =
            AccessRequest::new(request.access_mode, &share_path, key.disk_index, key.partition)
                .with_drive_letter(args.letter)
                .with_surface_name(args.surface_name.clone());
        let access = match self.access.create_access(&access_request, cancel).await {
            Ok(access) => access,
            Err(failure) => {
                let message = if failure.cancelled {
                    CANCELLED_MESSAGE.to_string()
                } else {
                    failure.message
                };
                return self
                    .abort(request, &mounted, ownership, failure.step, message, failure.code)
                    .await;
            }
        };

        let distribution = mounted
            .distribution
            .clone()
            .or_else(|| args.distribution.clone())
            .unwrap_or_default();
        let record = ActiveMount::new(
            key,
            request.access_mode,
            distribution,
            mounted.internal_path.clone().unwrap_or_default(),
            Some(share_path),
        )
        .with_drive_letter(access.drive_letter)
        .with_surface_name(access.surface_name);

        let mut result = MountAndMapResult::from_mount(&record);
        if let Err(e) = self.store.register(record).await {
            warn!("{} is mounted but could not be recorded: {}", key, e);
            result = result.with_warning(format!("Mount succeeded but was not recorded: {}", e));
        }
        info!("Mounted {} at {}", key, result.external_path.as_deref().unwrap_or(""));
        result
    }

    fn validate(&self, request: &MountRequest) -> Result<Validated, String> {
        if request.partition < 1 {
            return Err("Partition numbers start at 1".to_string());
        }

        let fs_type = request.fs_type.trim();
        if fs_type.is_empty() {
            return Err("A filesystem type is required (use 'auto' to probe)".to_string());
        }

        let letter = match (request.access_mode, request.drive_letter) {
            (AccessMode::DriveLetterLegacy, None) => {
                return Err("Drive letter mode requires a drive letter".to_string());
            }
            (AccessMode::DriveLetterLegacy, Some(c)) => Some(
                DriveLetter::new(c).ok_or_else(|| format!("'{}' is not a valid drive letter", c))?,
            ),
            _ => None,
        };

        let surface_name = match (request.access_mode, request.surface_name.as_deref()) {
            (AccessMode::NetworkLocation, Some(name)) => Some(
                sanitize_surface_name(name)
                    .ok_or_else(|| format!("'{}' is not a usable network location name", name))?,
            ),
            _ => None,
        };

        let distribution = request
            .distribution
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.default_distribution.clone());

        Ok(Validated {
            letter,
            surface_name,
            fs_type: fs_type.to_string(),
            distribution,
        })
    }

    /// Whether an existing record already serves this request unchanged
    fn satisfies(existing: &ActiveMount, request: &MountRequest, args: &Validated) -> bool {
        if existing.access_mode != request.access_mode || !existing.has_external_path() {
            return false;
        }
        if let Some(distribution) = &args.distribution
            && !existing.distribution.eq_ignore_ascii_case(distribution)
        {
            return false;
        }
        match request.access_mode {
            AccessMode::DriveLetterLegacy => existing.drive_letter == args.letter,
            AccessMode::NetworkLocation => match &args.surface_name {
                Some(name) => existing
                    .surface_name
                    .as_deref()
                    .is_some_and(|existing| existing.eq_ignore_ascii_case(name)),
                None => true,
            },
            AccessMode::None => true,
        }
    }

    /// Conflicts that are knowable before anything runs
    async fn check_conflicts(
        &self,
        request: &MountRequest,
        args: &Validated,
        prior: Option<&ActiveMount>,
    ) -> Result<(), String> {
        let key = request.key();

        if let Some(letter) = args.letter {
            match self.store.get_by_letter(letter).await {
                Ok(Some(owner)) if owner.key() != key => {
                    return Err(format!(
                        "Drive letter {}: is already mapped for {}",
                        letter,
                        owner.key()
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(format!("Could not read mount state: {}", e)),
            }

            let ours = prior.and_then(ActiveMount::bound_letter) == Some(letter);
            match self.letters.list_used_letters().await {
                Ok(used) if used.contains(&letter) && !ours => {
                    return Err(format!("Drive letter {}: is already in use", letter));
                }
                Ok(_) => {}
                Err(e) => warn!("Could not list used drive letters, skipping check: {}", e),
            }
        }

        if let Some(name) = &args.surface_name {
            let records = self
                .store
                .list_all()
                .await
                .map_err(|e| format!("Could not read mount state: {}", e))?;
            if let Some(owner) = records.iter().find(|record| {
                record.key() != key
                    && record
                        .bound_surface_name()
                        .is_some_and(|bound| bound.eq_ignore_ascii_case(name))
            }) {
                return Err(format!(
                    "Network location '{}' is already used by {}",
                    name,
                    owner.key()
                ));
            }
        }

        Ok(())
    }

    /// `None` when the caller cancelled
    async fn run_mount(
        &self,
        request: &MountRequest,
        fs_type: &str,
        distribution: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<MountResult> {
        let command = CommandRequest::elevated(MOUNT_DISK)
            .arg("DiskIndex", request.disk_index)
            .arg("Partition", request.partition)
            .arg("FsType", fs_type)
            .arg_opt("Distro", distribution);
        match self.runner.run(command, cancel).await {
            Ok(response) => Some(MountResult::from_response(&response)),
            Err(e) if e.is_cancelled() => None,
            Err(e) => Some(MountResult::failed(e.message)),
        }
    }

    /// Mount with the requested fstype, falling back once to `auto`
    async fn mount_with_fallback(
        &self,
        request: &MountRequest,
        args: &Validated,
        cancel: &CancellationToken,
    ) -> Result<MountResult, MountAndMapResult> {
        let cancelled = || self.failure(request, FailedStep::Mount, CANCELLED_MESSAGE);
        let distribution = args.distribution.as_deref();

        let first = self
            .run_mount(request, &args.fs_type, distribution, cancel)
            .await
            .ok_or_else(cancelled)?;
        if first.success {
            return Ok(first);
        }

        let outcome = if policy::should_retry_with_auto(&first, &args.fs_type) {
            warn!(
                "Mount of {} with fstype {} failed ({}), retrying with {}",
                request.key(),
                args.fs_type,
                first.display_error(),
                AUTO_FS_TYPE
            );
            // Clear anything the failed attempt left attached.
            if let Err(e) = self.unmount_detached(request.disk_index).await {
                debug!("Pre-retry unmount failed: {}", e);
            }
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            let retry = self
                .run_mount(request, AUTO_FS_TYPE, distribution, cancel)
                .await
                .ok_or_else(cancelled)?;
            if retry.success {
                info!("Retry with {} succeeded", AUTO_FS_TYPE);
                return Ok(retry);
            }
            policy::merge_retry_failure(&args.fs_type, first, retry)
        } else {
            first
        };

        error!("Mount of {} failed: {}", request.key(), outcome.display_error());
        Err(self
            .failure(request, FailedStep::Mount, outcome.display_error())
            .with_error_code(outcome.error_code))
    }

    /// Unmount with an independent token and the rollback ceiling
    async fn unmount_detached(&self, disk_index: u32) -> Result<(), String> {
        let token = CancellationToken::new();
        let run = self.runner.run(unmount_command(disk_index), &token);
        match tokio::time::timeout(self.settings.rollback_timeout, run).await {
            Err(_) => Err(format!(
                "unmount timed out after {:?}",
                self.settings.rollback_timeout
            )),
            Ok(Err(e)) => Err(e.message),
            Ok(Ok(response)) if response.is_ok() || policy::is_already_detached(&response) => Ok(()),
            Ok(Ok(response)) => Err(response.display_error()),
        }
    }

    /// Fail after the mount step, rolling back when this call owns the mount
    async fn abort(
        &self,
        request: &MountRequest,
        mounted: &MountResult,
        ownership: Ownership,
        step: FailedStep,
        message: String,
        code: Option<String>,
    ) -> MountAndMapResult {
        error!("Mount of {} failed at {}: {}", request.key(), step, message);
        let mut result = self
            .failure(request, step, message)
            .with_error_code(code.or_else(|| mounted.error_code.clone()));

        match ownership {
            Ownership::Created => {
                warn!("Rolling back mount of {}", request.key());
                match self.unmount_detached(request.disk_index).await {
                    Ok(()) => {
                        info!("Rolled back mount of {}", request.key());
                        if let Err(e) = self
                            .store
                            .unregister(request.disk_index, Some(request.partition))
                            .await
                        {
                            result = result
                                .with_warning(format!("Could not clear mount record: {}", e));
                        }
                    }
                    Err(e) => {
                        error!("Rollback of {} failed: {}", request.key(), e);
                        if let Some(message) = result.error_message.as_mut() {
                            message.push_str(&format!(" (rollback failed: {})", e));
                        }
                    }
                }
            }
            Ownership::HostReportedMounted => {
                info!(
                    "Skipping rollback of {}: the host reported it already mounted",
                    request.key()
                );
            }
            Ownership::PreviouslyRecorded => {
                info!(
                    "Skipping rollback of {}: it was mounted before this call",
                    request.key()
                );
            }
        }
        result
    }

    fn failure(
        &self,
        request: &MountRequest,
        step: FailedStep,
        message: impl Into<String>,
    ) -> MountAndMapResult {
        let mut result = MountAndMapResult::failure(
            request.disk_index,
            request.partition,
            request.access_mode,
            step,
            message,
        );
        match request.access_mode {
            AccessMode::DriveLetterLegacy => {
                result.drive_letter = request.drive_letter.and_then(DriveLetter::new);
            }
            AccessMode::NetworkLocation => result.surface_name = request.surface_name.clone(),
            AccessMode::None => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use mount_contracts::{BridgeError, BridgeErrorKind};
    use mount_types::CommandResponse;

    use super::*;
    use crate::access::{CREATE_NETWORK_LOCATION, MAP_DRIVE};
    use crate::orchestrator::UNMOUNT_DISK;
    use crate::testing::{FakeLetters, FakeProbe, FakeRunner, TempDir, letter};

    struct Harness {
        _temp: TempDir,
        runner: Arc<FakeRunner>,
        probe: Arc<FakeProbe>,
        letters: Arc<FakeLetters>,
        store: Arc<MountStateStore>,
        orchestrator: MountOrchestrator,
    }

    fn harness(label: &str) -> Harness {
        let temp = TempDir::new(label);
        let runner = Arc::new(FakeRunner::new());
        let probe = Arc::new(FakeProbe::new());
        let letters = Arc::new(FakeLetters::new(&['C']));
        let store = Arc::new(MountStateStore::new(
            temp.path().join("active-mounts.json"),
            letters.clone(),
            probe.clone(),
            Duration::from_millis(20),
        ));
        let access = Arc::new(AccessSurfaceService::new(runner.clone()));
        let settings = MountSettings {
            verify: VerifyPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(2),
                probe_timeout: Duration::from_millis(20),
            },
            rollback_timeout: Duration::from_millis(200),
            default_distribution: None,
        };
        let orchestrator = MountOrchestrator::new(
            runner.clone(),
            access,
            store.clone(),
            letters.clone(),
            probe.clone(),
            settings,
        );
        Harness {
            _temp: temp,
            runner,
            probe,
            letters,
            store,
            orchestrator,
        }
    }

    fn share(disk: u32, partition: u32) -> String {
        format!("\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE{disk}p{partition}")
    }

    fn mounted(disk: u32, partition: u32) -> CommandResponse {
        CommandResponse::ok()
            .with("UNC", share(disk, partition))
            .with("MountPath", format!("/mnt/wsl/PHYSICALDRIVE{disk}p{partition}"))
            .with("Distro", "Ubuntu")
    }

    #[tokio::test]
    async fn validation_rejects_before_any_command() {
        let h = harness("validate");
        let cancel = CancellationToken::new();

        let cases = [
            MountRequest::new(1, 0, AccessMode::None),
            MountRequest::new(1, 1, AccessMode::None).with_fs_type("  "),
            MountRequest::new(1, 1, AccessMode::DriveLetterLegacy),
            MountRequest::new(1, 1, AccessMode::DriveLetterLegacy).with_drive_letter('7'),
        ];
        for request in cases {
            let result = h.orchestrator.mount_and_map(&request, &cancel).await;
            assert!(!result.success);
            assert_eq!(result.failed_step, Some(FailedStep::Validation));
        }
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn full_workflow_records_mount() {
        let h = harness("happy");
        h.runner.respond(MOUNT_DISK, mounted(1, 2));
        h.probe.add(&share(1, 2));

        let request = MountRequest::new(1, 2, AccessMode::NetworkLocation).with_distribution("Ubuntu");
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.external_path, Some(share(1, 2)));
        assert_eq!(result.surface_name.as_deref(), Some("Linux Disk 1 Partition 2"));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK, CREATE_NETWORK_LOCATION]);

        let call = &h.runner.calls_for(MOUNT_DISK)[0];
        assert!(call.elevated);
        assert_eq!(call.get("FsType"), Some("ext4"));
        assert_eq!(call.get("Distro"), Some("Ubuntu"));

        let record = h.store.get(MountKey::new(1, 2)).await.unwrap().unwrap();
        assert!(record.verified);
        assert_eq!(record.distribution, "Ubuntu");
    }

    #[tokio::test]
    async fn existing_record_short_circuits() {
        let h = harness("reuse");
        h.runner.respond(MOUNT_DISK, mounted(1, 2));
        h.probe.add(&share(1, 2));
        let request = MountRequest::new(1, 2, AccessMode::None);
        let cancel = CancellationToken::new();

        let first = h.orchestrator.mount_and_map(&request, &cancel).await;
        assert!(first.success && !first.reused_existing);
        let second = h.orchestrator.mount_and_map(&request, &cancel).await;
        assert!(second.success && second.reused_existing);
        assert_eq!(second.external_path, first.external_path);
        assert_eq!(h.runner.calls_for(MOUNT_DISK).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_mounts_leave_one_record() {
        let h = harness("concurrent");
        h.runner.respond(MOUNT_DISK, mounted(3, 1));
        h.runner
            .respond(MOUNT_DISK, mounted(3, 1).with("AlreadyMounted", "true"));
        h.probe.add(&share(3, 1));

        let request = MountRequest::new(3, 1, AccessMode::NetworkLocation);
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(
            h.orchestrator.mount_and_map(&request, &cancel),
            h.orchestrator.mount_and_map(&request, &cancel)
        );
        assert!(a.success && b.success);
        assert_eq!(a.external_path, b.external_path);

        let records = h.store.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), MountKey::new(3, 1));
    }

    #[tokio::test]
    async fn excluded_error_code_is_not_retried() {
        let h = harness("xfs");
        h.runner.respond(
            MOUNT_DISK,
            CommandResponse::error("wrong fs type: Invalid argument")
                .with("ErrorCode", "XFS_UNSUPPORTED_FEATURES")
                .with("ErrorHint", "This XFS volume uses features the kernel lacks."),
        );

        let request = MountRequest::new(1, 2, AccessMode::None).with_fs_type("xfs");
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(result.error_code.as_deref(), Some("XFS_UNSUPPORTED_FEATURES"));
        assert_eq!(
            result.error_message.as_deref(),
            Some("This XFS volume uses features the kernel lacks. Details: wrong fs type: Invalid argument")
        );
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK]);
        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_argument_retries_with_auto() {
        let h = harness("auto");
        h.runner
            .respond(
                MOUNT_DISK,
                CommandResponse::error("mount: Invalid argument").with("ErrorCode", "EINVAL"),
            )
            .respond(MOUNT_DISK, mounted(1, 1).with("Distro", "Debian"));
        h.probe.add(&share(1, 1));

        let request = MountRequest::new(1, 1, AccessMode::None).with_fs_type("ext4");
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.distribution.as_deref(), Some("Debian"));
        assert_eq!(
            h.runner.commands(),
            vec![MOUNT_DISK, UNMOUNT_DISK, MOUNT_DISK]
        );
        let retry = &h.runner.calls_for(MOUNT_DISK)[1];
        assert_eq!(retry.get("FsType"), Some(AUTO_FS_TYPE));

        let record = h.store.get(MountKey::new(1, 1)).await.unwrap().unwrap();
        assert_eq!(record.distribution, "Debian");
    }

    #[tokio::test]
    async fn failed_retry_reports_both_attempts() {
        let h = harness("auto-fail");
        h.runner
            .respond(MOUNT_DISK, CommandResponse::error("mount: invalid argument"))
            .respond(
                MOUNT_DISK,
                CommandResponse::error("no known filesystem").with("ErrorCode", "ENODEV"),
            );

        let request = MountRequest::new(1, 1, AccessMode::None);
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(result.error_code.as_deref(), Some("ENODEV"));
        let message = result.error_message.unwrap();
        assert!(message.contains("mount: invalid argument"));
        assert!(message.contains("no known filesystem"));
    }

    #[tokio::test]
    async fn unreachable_share_rolls_back() {
        let h = harness("verify");
        h.runner.respond(MOUNT_DISK, mounted(1, 2));

        let request = MountRequest::new(1, 2, AccessMode::NetworkLocation);
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(h.probe.calls(), 3);
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK, UNMOUNT_DISK]);
        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn script_verified_share_is_noted_when_unreachable() {
        let h = harness("script-verified");
        h.runner
            .respond(MOUNT_DISK, mounted(1, 2).with("UncVerified", "yes"));

        let result = h
            .orchestrator
            .mount_and_map(
                &MountRequest::new(1, 2, AccessMode::None),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert!(
            result
                .error_message
                .unwrap()
                .contains("although the mount script reported it reachable")
        );
    }

    #[tokio::test]
    async fn missing_share_path_rolls_back() {
        let h = harness("no-unc");
        h.runner.respond(MOUNT_DISK, CommandResponse::ok());

        let result = h
            .orchestrator
            .mount_and_map(
                &MountRequest::new(1, 2, AccessMode::None),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK, UNMOUNT_DISK]);
        assert_eq!(h.probe.calls(), 0);
    }

    #[tokio::test]
    async fn already_mounted_is_not_rolled_back() {
        let h = harness("no-rollback");
        h.runner
            .respond(MOUNT_DISK, mounted(1, 2).with("AlreadyMounted", "True"));

        let result = h
            .orchestrator
            .mount_and_map(
                &MountRequest::new(1, 2, AccessMode::None),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK]);
    }

    #[tokio::test]
    async fn map_failure_rolls_back_and_annotates_rollback_error() {
        let h = harness("map-fail");
        h.runner
            .respond(MOUNT_DISK, mounted(2, 1))
            .respond(MAP_DRIVE, CommandResponse::error("The network path was not found"))
            .respond(UNMOUNT_DISK, CommandResponse::error("Access is denied"));
        h.probe.add(&share(2, 1));

        let request = MountRequest::new(2, 1, AccessMode::DriveLetterLegacy).with_drive_letter('y');
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;

        assert_eq!(result.failed_step, Some(FailedStep::Map));
        let message = result.error_message.unwrap();
        assert!(message.starts_with("The network path was not found"));
        assert!(message.contains("rollback failed: Access is denied"));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK, MAP_DRIVE, UNMOUNT_DISK]);
        assert!(h.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn letter_conflicts_are_rejected_before_mounting() {
        let h = harness("letter");
        h.letters.bind('Z');
        let request = MountRequest::new(4, 1, AccessMode::DriveLetterLegacy).with_drive_letter('z');
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Validation));
        assert!(h.runner.calls().is_empty());

        // A letter held by another record is a conflict even if the host forgot it.
        h.letters.release('Z');
        h.store
            .register(
                ActiveMount::new(
                    MountKey::new(5, 1),
                    AccessMode::DriveLetterLegacy,
                    "Ubuntu",
                    "/mnt/wsl/PHYSICALDRIVE5p1",
                    Some(share(5, 1)),
                )
                .with_drive_letter(Some(letter('Z'))),
            )
            .await
            .unwrap();
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Validation));
        assert!(result.error_message.unwrap().contains("disk 5 partition 1"));
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_mount_step_does_not_roll_back() {
        let h = harness("cancel-mount");
        h.runner.hang(MOUNT_DISK);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = h
            .orchestrator
            .mount_and_map(&MountRequest::new(1, 1, AccessMode::None), &cancel)
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK]);
    }

    #[tokio::test]
    async fn cancelled_mapping_still_rolls_back() {
        let h = harness("cancel-map");
        h.runner.respond(MOUNT_DISK, mounted(1, 1));
        h.runner.hang(CREATE_NETWORK_LOCATION);
        h.probe.add(&share(1, 1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = h
            .orchestrator
            .mount_and_map(&MountRequest::new(1, 1, AccessMode::NetworkLocation), &cancel)
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Map));
        assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        // The rollback ran on its own token after the caller cancelled.
        assert_eq!(
            h.runner.commands(),
            vec![MOUNT_DISK, CREATE_NETWORK_LOCATION, UNMOUNT_DISK]
        );
    }

    #[tokio::test]
    async fn unrecorded_mount_is_still_a_success_with_warning() {
        let h = harness("record-conflict");
        h.store
            .register(
                ActiveMount::new(
                    MountKey::new(2, 1),
                    AccessMode::NetworkLocation,
                    "Ubuntu",
                    "/mnt/wsl/PHYSICALDRIVE2p1",
                    Some(share(2, 1)),
                )
                .with_surface_name(Some("Media".into())),
            )
            .await
            .unwrap();
        // The script hands back a name that another record already owns.
        h.runner
            .respond(MOUNT_DISK, mounted(1, 1))
            .respond(CREATE_NETWORK_LOCATION, CommandResponse::ok().with("Name", "Media"));
        h.probe.add(&share(1, 1));

        let result = h
            .orchestrator
            .mount_and_map(
                &MountRequest::new(1, 1, AccessMode::NetworkLocation),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.failed_step, None);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("not recorded"));
        assert_eq!(h.runner.commands(), vec![MOUNT_DISK, CREATE_NETWORK_LOCATION]);
        assert!(h.store.get(MountKey::new(1, 1)).await.unwrap().is_none());
        assert_eq!(h.store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_reports_only_the_surface_the_mode_uses() {
        let h = harness("failure-fields");
        h.runner
            .respond(MOUNT_DISK, CommandResponse::error("The disk is offline"));

        let request = MountRequest::new(1, 1, AccessMode::None)
            .with_drive_letter('X')
            .with_surface_name("Media");
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(result.drive_letter, None);
        assert_eq!(result.surface_name, None);

        let request = MountRequest::new(1, 1, AccessMode::DriveLetterLegacy)
            .with_drive_letter('x')
            .with_surface_name("Media");
        let result = h
            .orchestrator
            .mount_and_map(&request, &CancellationToken::new())
            .await;
        assert_eq!(result.drive_letter, Some(letter('X')));
        assert_eq!(result.surface_name, None);
    }

    #[tokio::test]
    async fn boundary_errors_surface_as_mount_failures() {
        let h = harness("boundary");
        h.runner.respond_with(
            MOUNT_DISK,
            Err(BridgeError::new(BridgeErrorKind::Timeout, "elevated command timed out")),
        );
        let result = h
            .orchestrator
            .mount_and_map(
                &MountRequest::new(1, 1, AccessMode::None),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.failed_step, Some(FailedStep::Mount));
        assert_eq!(
            result.error_message.as_deref(),
            Some("elevated command timed out")
        );
    }
}
