// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use mount_contracts::{CommandRunner, DiskEnumerator, DriveLetterProvider, PathProbe};
use mount_sys::{
    FsPathProbe, RunnerSettings, ScriptDiskEnumerator, ScriptHost,
    ScriptLetterProvider, ScriptRunner,
};
use tracing::{debug, info};

use crate::access::AccessSurfaceService;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::orchestrator::{
    MountOrchestrator, MountSettings, UnmountOrchestrator, VerifyPolicy,
};
use crate::state::MountStateStore;

/// Host-facing collaborators the core is wired against
pub struct HostAdapters {
    pub runner: Arc<dyn CommandRunner>,
    pub disks: Arc<dyn DiskEnumerator>,
    pub letters: Arc<dyn DriveLetterProvider>,
    pub probe: Arc<dyn PathProbe>,
}

impl HostAdapters {
    /// Script-backed adapters for the local host
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let scripts_dir = config.scripts_dir();
        let host = match &config.script_host {
            Some(custom) => ScriptHost {
                program: custom.program.clone(),
                args: custom.args.clone(),
                file_flag: custom.file_flag.clone(),
                extension: custom.extension.clone(),
                scripts_dir,
            },
            None => ScriptHost::find_default(scripts_dir)?,
        };
        info!(
            "Using script host {:?} with scripts in {:?}",
            host.program, host.scripts_dir
        );

        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptRunner::new(
            host,
            RunnerSettings {
                command_timeout: config.command_timeout(),
                poll_interval: config.elevated_poll_interval(),
            },
        ));
        let probe: Arc<dyn PathProbe> = Arc::new(FsPathProbe);

        Ok(Self {
            disks: Arc::new(ScriptDiskEnumerator::new(runner.clone())),
            letters: Arc::new(ScriptLetterProvider::new(runner.clone())),
            runner,
            probe,
        })
    }
}

/// Owns one instance of every core component, built from configuration
pub struct ServiceRegistry {
    disks: Arc<dyn DiskEnumerator>,
    store: Arc<MountStateStore>,
    access: Arc<AccessSurfaceService>,
    mount: Arc<MountOrchestrator>,
    unmount: Arc<UnmountOrchestrator>,
}

impl ServiceRegistry {
    pub fn build_default(config: &BridgeConfig) -> Result<Self> {
        let adapters = HostAdapters::from_config(config)?;
        Ok(Self::build(config, adapters))
    }

    pub fn build(config: &BridgeConfig, adapters: HostAdapters) -> Self {
        let state_file = config.state_file();
        debug!("Mount state file: {:?}", state_file);

        let store = Arc::new(MountStateStore::new(
            state_file,
            adapters.letters.clone(),
            adapters.probe.clone(),
            config.reconcile_probe_timeout(),
        ));
        let access = Arc::new(AccessSurfaceService::new(adapters.runner.clone()));
        let settings = MountSettings {
            verify: VerifyPolicy {
                attempts: config.verify_attempts,
                base_delay: config.verify_base_delay(),
                probe_timeout: config.probe_timeout(),
            },
            rollback_timeout: config.rollback_timeout(),
            default_distribution: config.default_distribution.clone(),
        };

        let mount = Arc::new(MountOrchestrator::new(
            adapters.runner.clone(),
            access.clone(),
            store.clone(),
            adapters.letters.clone(),
            adapters.probe.clone(),
            settings,
        ));
        let unmount = Arc::new(UnmountOrchestrator::new(
            adapters.runner,
            access.clone(),
            store.clone(),
        ));

        Self {
            disks: adapters.disks,
            store,
            access,
            mount,
            unmount,
        }
    }

    pub fn disks(&self) -> Arc<dyn DiskEnumerator> {
        self.disks.clone()
    }

    pub fn store(&self) -> Arc<MountStateStore> {
        self.store.clone()
    }

    pub fn access(&self) -> Arc<AccessSurfaceService> {
        self.access.clone()
    }

    pub fn mount(&self) -> Arc<MountOrchestrator> {
        self.mount.clone()
    }

    pub fn unmount(&self) -> Arc<UnmountOrchestrator> {
        self.unmount.clone()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mount_contracts::BridgeError;
    use mount_types::{AccessMode, CommandResponse, DiskInfo};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::orchestrator::{MOUNT_DISK, MountRequest, UnmountRequest};
    use crate::testing::{FakeLetters, FakeProbe, FakeRunner, TempDir};

    struct NoDisks;

    #[async_trait]
    impl DiskEnumerator for NoDisks {
        async fn list_candidate_disks(&self) -> std::result::Result<Vec<DiskInfo>, BridgeError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn components_share_one_store() {
        let temp = TempDir::new("registry");
        let config = BridgeConfig {
            state_file: Some(temp.path().join("mounts.json")),
            verify_attempts: 1,
            verify_base_delay_ms: 1,
            probe_timeout_ms: 20,
            log_to_disk: false,
            ..BridgeConfig::default()
        };

        let share = "\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE1p1";
        let runner = Arc::new(FakeRunner::new());
        runner.respond(MOUNT_DISK, CommandResponse::ok().with("UNC", share));
        let probe = Arc::new(FakeProbe::new());
        probe.add(share);

        let registry = ServiceRegistry::build(
            &config,
            HostAdapters {
                runner,
                disks: Arc::new(NoDisks),
                letters: Arc::new(FakeLetters::new(&['C'])),
                probe,
            },
        );

        let cancel = CancellationToken::new();
        let mounted = registry
            .mount()
            .mount_and_map(&MountRequest::new(1, 1, AccessMode::None), &cancel)
            .await;
        assert!(mounted.success, "{:?}", mounted.error_message);
        assert_eq!(registry.store().list_all().await.unwrap().len(), 1);

        let unmounted = registry
            .unmount()
            .unmount_and_unmap(&UnmountRequest::new(1), &cancel)
            .await;
        assert!(unmounted.success);
        assert!(registry.store().list_all().await.unwrap().is_empty());
        assert!(registry.disks().list_candidate_disks().await.unwrap().is_empty());
    }
}
