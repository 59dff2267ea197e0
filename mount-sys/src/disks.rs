// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use mount_contracts::{BridgeError, BridgeErrorKind, CommandRunner, DiskEnumerator};
use mount_types::{CommandRequest, DiskInfo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LIST_DISKS_COMMAND: &str = "list-disks";
const DISKS_KEY: &str = "DisksJson";

/// [`DiskEnumerator`] backed by the `list-disks` inventory script
///
/// The script answers `STATUS=OK` plus a single-line `DisksJson=[...]`.
#[derive(Clone)]
pub struct ScriptDiskEnumerator {
    runner: Arc<dyn CommandRunner>,
}

impl ScriptDiskEnumerator {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DiskEnumerator for ScriptDiskEnumerator {
    async fn list_candidate_disks(&self) -> Result<Vec<DiskInfo>, BridgeError> {
        let response = self
            .runner
            .run(CommandRequest::new(LIST_DISKS_COMMAND), &CancellationToken::new())
            .await?;

        if !response.is_ok() {
            return Err(BridgeError::new(
                BridgeErrorKind::CommandFailed,
                format!("Failed to enumerate disks: {}", response.display_error()),
            ));
        }

        let raw = response.get(DISKS_KEY).unwrap_or("[]");
        let disks: Vec<DiskInfo> = serde_json::from_str(raw).map_err(|e| {
            BridgeError::new(
                BridgeErrorKind::Internal,
                format!("Failed to parse disk inventory: {}", e),
            )
        })?;

        let mut candidates: Vec<DiskInfo> =
            disks.into_iter().filter(DiskInfo::is_candidate).collect();
        candidates.sort_by_key(|disk| disk.index);
        debug!("Found {} candidate disks", candidates.len());
        Ok(candidates)
    }
}
