// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

/// Existence check for a host-addressable path
///
/// Implementations may block for a long time on dead network targets;
/// callers bound every call with their own timeout.
#[async_trait]
pub trait PathProbe: Send + Sync {
    async fn exists(&self, path: &str) -> bool;
}
