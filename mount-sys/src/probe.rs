// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use mount_contracts::PathProbe;
use tracing::trace;

/// [`PathProbe`] backed by the host filesystem
///
/// Share paths are UNC paths served by the sandbox, so a hung sandbox makes
/// this call hang; callers wrap it in a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPathProbe;

#[async_trait]
impl PathProbe for FsPathProbe {
    async fn exists(&self, path: &str) -> bool {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        trace!("Probe {} -> {}", path, exists);
        exists
    }
}
