// SPDX-License-Identifier: GPL-3.0-only

//! Persisted record of believed-active mounts
//!
//! The store is the only reader and writer of the state file. Every
//! operation holds one exclusive async lock end-to-end, so a
//! read-modify-write (including the probes of a reconcile pass) never
//! interleaves with another operation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use mount_contracts::{DriveLetterProvider, PathProbe};
use mount_types::{ActiveMount, DriveLetter, MountKey};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError};

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    mounts: Vec<ActiveMount>,
}

pub struct MountStateStore {
    path: PathBuf,
    letters: Arc<dyn DriveLetterProvider>,
    probe: Arc<dyn PathProbe>,
    probe_timeout: Duration,
    /// Cached document, loaded on first use
    mounts: Mutex<Option<Vec<ActiveMount>>>,
}

impl MountStateStore {
    pub fn new(
        path: impl Into<PathBuf>,
        letters: Arc<dyn DriveLetterProvider>,
        probe: Arc<dyn PathProbe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            letters,
            probe,
            probe_timeout,
            mounts: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the record for the mount's (disk, partition)
    ///
    /// Fails with a conflict when the record's drive letter or surface
    /// name already belongs to a different (disk, partition).
    pub async fn register(&self, mount: ActiveMount) -> Result<()> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;

        let key = mount.key();
        for other in mounts.iter().filter(|other| other.key() != key) {
            if let Some(letter) = mount.bound_letter()
                && other.bound_letter() == Some(letter)
            {
                return Err(ServiceError::Conflict(format!(
                    "drive letter {} is already bound to {}",
                    letter,
                    other.key()
                )));
            }
            if let Some(name) = mount.bound_surface_name()
                && other
                    .bound_surface_name()
                    .is_some_and(|existing| existing.eq_ignore_ascii_case(name))
            {
                return Err(ServiceError::Conflict(format!(
                    "network location '{}' is already bound to {}",
                    name,
                    other.key()
                )));
            }
        }

        let mut next: Vec<ActiveMount> = mounts
            .iter()
            .filter(|existing| existing.key() != key)
            .cloned()
            .collect();
        next.push(mount);
        next.sort_by_key(ActiveMount::key);

        self.persist(&next).await?;
        *mounts = next;
        info!("Registered active mount for {}", key);
        Ok(())
    }

    /// Remove the record for one partition, or every record of the disk when `partition` is `None`
    pub async fn unregister(&self, disk_index: u32, partition: Option<u32>) -> Result<Vec<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;

        let matches = |mount: &ActiveMount| {
            mount.disk_index == disk_index && partition.is_none_or(|p| mount.partition == p)
        };
        let (removed, kept): (Vec<ActiveMount>, Vec<ActiveMount>) =
            mounts.iter().cloned().partition(|mount| matches(mount));

        if removed.is_empty() {
            debug!("No active mount to unregister for disk {}", disk_index);
            return Ok(removed);
        }

        self.persist(&kept).await?;
        *mounts = kept;
        info!("Unregistered {} mount(s) for disk {}", removed.len(), disk_index);
        Ok(removed)
    }

    pub async fn get(&self, key: MountKey) -> Result<Option<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;
        Ok(mounts.iter().find(|mount| mount.key() == key).cloned())
    }

    pub async fn get_by_disk(&self, disk_index: u32) -> Result<Vec<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;
        Ok(mounts
            .iter()
            .filter(|mount| mount.disk_index == disk_index)
            .cloned()
            .collect())
    }

    pub async fn get_by_letter(&self, letter: DriveLetter) -> Result<Option<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;
        Ok(mounts
            .iter()
            .find(|mount| mount.bound_letter() == Some(letter))
            .cloned())
    }

    pub async fn list_all(&self) -> Result<Vec<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        Ok(self.load_into(&mut guard).await?.clone())
    }

    /// Drop every record; returns how many were removed
    pub async fn clear_all(&self) -> Result<usize> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;
        let count = mounts.len();
        self.persist(&[]).await?;
        mounts.clear();
        info!("Cleared {} active mount record(s)", count);
        Ok(count)
    }

    /// Cross-check records against the live system and prune orphans
    ///
    /// 1. Drive-letter records whose letter the host no longer has bound are orphaned.
    /// 2. Every surviving external path is probed concurrently, each under its own timeout.
    /// 3. Each survivor's `verified` flag is set from its own probe; records
    ///    without an external path count as verified.
    ///
    /// The file is rewritten only when orphans were removed. Returns the orphans.
    pub async fn reconcile(&self) -> Result<Vec<ActiveMount>> {
        let mut guard = self.mounts.lock().await;
        let mounts = self.load_into(&mut guard).await?;

        let used: Option<HashSet<DriveLetter>> = match self.letters.list_used_letters().await {
            Ok(letters) => Some(letters.into_iter().collect()),
            Err(e) => {
                warn!("Skipping drive letter check, letter query failed: {}", e);
                None
            }
        };

        let (orphaned, mut survivors): (Vec<ActiveMount>, Vec<ActiveMount>) =
            mounts.iter().cloned().partition(|mount| {
                match (mount.bound_letter(), used.as_ref()) {
                    (Some(letter), Some(used)) => !used.contains(&letter),
                    _ => false,
                }
            });

        let checks = survivors.iter().map(|mount| {
            let probe = self.probe.clone();
            let timeout = self.probe_timeout;
            let path = mount
                .external_path
                .clone()
                .filter(|path| !path.trim().is_empty());
            async move {
                match path {
                    None => true,
                    Some(path) => tokio::time::timeout(timeout, probe.exists(&path))
                        .await
                        .unwrap_or(false),
                }
            }
        });
        let results = join_all(checks).await;

        let now = Utc::now();
        for (mount, reachable) in survivors.iter_mut().zip(results) {
            if mount.verified && !reachable {
                warn!("Share path for {} is not reachable", mount.key());
            }
            mount.verified = reachable;
            if reachable {
                mount.last_verified = Some(now);
            }
        }

        if !orphaned.is_empty() {
            self.persist(&survivors).await?;
            for mount in &orphaned {
                info!(
                    "Removed orphaned mount for {} (letter {:?} no longer bound)",
                    mount.key(),
                    mount.drive_letter.map(|l| l.as_char())
                );
            }
        }
        *mounts = survivors;
        Ok(orphaned)
    }

    async fn load_into<'a>(
        &self,
        slot: &'a mut Option<Vec<ActiveMount>>,
    ) -> Result<&'a mut Vec<ActiveMount>> {
        let mounts = match slot.take() {
            Some(mounts) => mounts,
            None => self.read_document().await?,
        };
        Ok(slot.insert(mounts))
    }

    async fn read_document(&self) -> Result<Vec<ActiveMount>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.persistence_error(e)),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: StateDocument =
            serde_json::from_str(&raw).map_err(|e| self.persistence_error(e))?;
        if document.version != DOCUMENT_VERSION {
            return Err(self.persistence_error(format!(
                "unsupported state version {}",
                document.version
            )));
        }
        Ok(document.mounts)
    }

    /// Rewrite the whole document through a temp file and rename
    async fn persist(&self, mounts: &[ActiveMount]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error(e))?;
        }

        let document = StateDocument {
            version: DOCUMENT_VERSION,
            mounts: mounts.to_vec(),
        };
        let content =
            serde_json::to_string_pretty(&document).map_err(|e| self.persistence_error(e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| self.persistence_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.persistence_error(e))?;
        Ok(())
    }

    fn persistence_error(&self, reason: impl ToString) -> ServiceError {
        ServiceError::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mount_types::AccessMode;

    use super::*;
    use crate::testing::{FakeLetters, FakeProbe, TempDir, letter};

    struct Fixture {
        _temp: TempDir,
        letters: Arc<FakeLetters>,
        probe: Arc<FakeProbe>,
        store: MountStateStore,
    }

    fn fixture(label: &str) -> Fixture {
        let temp = TempDir::new(label);
        let letters = Arc::new(FakeLetters::new(&['C']));
        let probe = Arc::new(FakeProbe::new());
        let store = MountStateStore::new(
            temp.path().join("state").join("active-mounts.json"),
            letters.clone(),
            probe.clone(),
            Duration::from_millis(50),
        );
        Fixture {
            _temp: temp,
            letters,
            probe,
            store,
        }
    }

    fn share(disk: u32, partition: u32) -> String {
        format!("\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE{disk}p{partition}")
    }

    fn drive_mount(disk: u32, partition: u32, c: char) -> ActiveMount {
        ActiveMount::new(
            MountKey::new(disk, partition),
            AccessMode::DriveLetterLegacy,
            "Ubuntu",
            format!("/mnt/wsl/PHYSICALDRIVE{disk}p{partition}"),
            Some(share(disk, partition)),
        )
        .with_drive_letter(Some(letter(c)))
    }

    fn network_mount(disk: u32, partition: u32, name: &str) -> ActiveMount {
        ActiveMount::new(
            MountKey::new(disk, partition),
            AccessMode::NetworkLocation,
            "Ubuntu",
            format!("/mnt/wsl/PHYSICALDRIVE{disk}p{partition}"),
            Some(share(disk, partition)),
        )
        .with_surface_name(Some(name.to_string()))
    }

    #[tokio::test]
    async fn register_replaces_same_key_and_persists() {
        let fx = fixture("replace");
        fx.store.register(network_mount(1, 2, "Data")).await.unwrap();
        fx.store.register(network_mount(1, 2, "Data")).await.unwrap();
        fx.store.register(network_mount(1, 1, "Boot")).await.unwrap();

        let all = fx.store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key(), MountKey::new(1, 1));

        let reopened = MountStateStore::new(
            fx.store.path(),
            fx.letters.clone(),
            fx.probe.clone(),
            Duration::from_millis(50),
        );
        assert_eq!(reopened.list_all().await.unwrap(), all);
    }

    #[tokio::test]
    async fn register_rejects_letter_and_name_conflicts() {
        let fx = fixture("conflict");
        fx.store.register(drive_mount(1, 1, 'Z')).await.unwrap();
        fx.store.register(network_mount(2, 1, "Data")).await.unwrap();

        let letter_clash = fx.store.register(drive_mount(3, 1, 'z')).await;
        assert!(matches!(letter_clash, Err(ServiceError::Conflict(_))));

        let name_clash = fx.store.register(network_mount(3, 1, "DATA")).await;
        assert!(matches!(name_clash, Err(ServiceError::Conflict(_))));

        // Same key may rebind its own letter.
        fx.store.register(drive_mount(1, 1, 'Z')).await.unwrap();
        assert_eq!(fx.store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lookups_by_disk_partition_and_letter() {
        let fx = fixture("lookup");
        fx.store.register(drive_mount(4, 1, 'X')).await.unwrap();
        fx.store.register(network_mount(4, 2, "Media")).await.unwrap();

        assert_eq!(fx.store.get_by_disk(4).await.unwrap().len(), 2);
        assert!(fx.store.get(MountKey::new(4, 3)).await.unwrap().is_none());
        let by_letter = fx.store.get_by_letter(letter('x')).await.unwrap().unwrap();
        assert_eq!(by_letter.key(), MountKey::new(4, 1));
    }

    #[tokio::test]
    async fn unregister_partition_or_whole_disk() {
        let fx = fixture("unregister");
        fx.store.register(network_mount(5, 1, "A")).await.unwrap();
        fx.store.register(network_mount(5, 2, "B")).await.unwrap();
        fx.store.register(network_mount(6, 1, "C")).await.unwrap();

        let removed = fx.store.unregister(5, Some(2)).await.unwrap();
        assert_eq!(removed.len(), 1);
        let removed = fx.store.unregister(5, None).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(fx.store.unregister(5, None).await.unwrap().is_empty());
        assert_eq!(fx.store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_all_empties_file() {
        let fx = fixture("clear");
        fx.store.register(network_mount(1, 1, "A")).await.unwrap();
        assert_eq!(fx.store.clear_all().await.unwrap(), 1);
        let raw = std::fs::read_to_string(fx.store.path()).unwrap();
        assert!(raw.contains("\"mounts\": []"));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let fx = fixture("corrupt");
        std::fs::create_dir_all(fx.store.path().parent().unwrap()).unwrap();
        std::fs::write(fx.store.path(), "{ not json").unwrap();
        let result = fx.store.list_all().await;
        assert!(matches!(result, Err(ServiceError::Persistence { .. })));
        // The broken file is left for inspection.
        assert_eq!(std::fs::read_to_string(fx.store.path()).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn freed_letter_is_orphaned_by_exactly_one_pass() {
        let fx = fixture("orphan");
        fx.letters.bind('Y');
        fx.probe.add(&share(1, 1));
        fx.probe.add(&share(2, 1));
        fx.store.register(drive_mount(1, 1, 'Y')).await.unwrap();
        fx.store.register(network_mount(2, 1, "Data")).await.unwrap();

        assert!(fx.store.reconcile().await.unwrap().is_empty());

        fx.letters.release('Y');
        let removed = fx.store.reconcile().await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key(), MountKey::new(1, 1));

        assert!(fx.store.reconcile().await.unwrap().is_empty());
        assert_eq!(fx.store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_flags_unreachable_shares_without_removing() {
        let fx = fixture("verify");
        fx.probe.add(&share(1, 1));
        fx.probe.hang(&share(2, 1));
        fx.store.register(network_mount(1, 1, "Up")).await.unwrap();
        fx.store.register(network_mount(2, 1, "Hung")).await.unwrap();
        fx.store.register(network_mount(3, 1, "Gone")).await.unwrap();
        let mut pathless = network_mount(4, 1, "Pathless");
        pathless.external_path = None;
        pathless.verified = false;
        fx.store.register(pathless).await.unwrap();

        let started = std::time::Instant::now();
        let removed = fx.store.reconcile().await.unwrap();
        assert!(removed.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));

        let verified: Vec<(u32, bool)> = fx
            .store
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|mount| (mount.disk_index, mount.verified))
            .collect();
        assert_eq!(verified, vec![(1, true), (2, false), (3, false), (4, true)]);
    }

    #[tokio::test]
    async fn failed_letter_query_orphans_nothing() {
        let fx = fixture("letters-down");
        fx.letters.bind('Q');
        fx.store.register(drive_mount(1, 1, 'Q')).await.unwrap();
        fx.letters.fail();
        assert!(fx.store.reconcile().await.unwrap().is_empty());
        assert_eq!(fx.store.list_all().await.unwrap().len(), 1);
    }
}
