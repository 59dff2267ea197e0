// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end cases driving the two orchestrator entry points

use std::sync::Arc;

use async_trait::async_trait;
use mount_service::{MountRequest, ServiceRegistry, UnmountRequest};
use mount_types::AccessMode;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::harness::support::{self, Target};

#[derive(Debug, Clone, Default)]
pub struct HarnessContext {
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait HarnessTest: Send + Sync {
    fn id(&self) -> &'static str;
    fn suite(&self) -> &'static str;
    /// Touches the target disk
    fn destructive(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &HarnessContext) -> Result<()>;
}

pub type TestRef = Arc<dyn HarnessTest>;

pub fn instantiate_tests() -> Vec<TestRef> {
    vec![
        Arc::new(MountUnmountRoundtrip),
        Arc::new(MountIdempotent),
        Arc::new(ReconcileIdempotent),
        Arc::new(UnmountIdempotent),
    ]
}

/// Registry and target for a destructive case, or the reason it is skipped
fn prepare(label: &str) -> Result<(ServiceRegistry, Target)> {
    let target = support::target()?;
    support::require_destructive(label)?;
    Ok((support::registry()?, target))
}

fn mount_request(target: &Target) -> MountRequest {
    MountRequest::new(target.disk_index, target.partition, AccessMode::None)
        .with_fs_type(target.fs_type.clone())
}

async fn unmount(registry: &ServiceRegistry, target: &Target, ctx: &HarnessContext) -> Result<()> {
    let result = registry
        .unmount()
        .unmount_and_unmap(&UnmountRequest::new(target.disk_index), &ctx.cancel)
        .await;
    support::ensure(
        result.success,
        format!("unmount failed: {:?}", result.error_message),
    )
}

pub struct MountUnmountRoundtrip;

#[async_trait]
impl HarnessTest for MountUnmountRoundtrip {
    fn id(&self) -> &'static str {
        "mount.unmount.roundtrip"
    }

    fn suite(&self) -> &'static str {
        "mount"
    }

    async fn execute(&self, ctx: &HarnessContext) -> Result<()> {
        let (registry, target) = prepare(self.id())?;

        let mounted = registry
            .mount()
            .mount_and_map(&mount_request(&target), &ctx.cancel)
            .await;
        support::ensure(
            mounted.success,
            format!(
                "mount failed at {:?}: {:?}",
                mounted.failed_step, mounted.error_message
            ),
        )?;
        support::ensure(
            mounted.external_path.is_some(),
            "mount succeeded without a share path",
        )?;
        let recorded = registry.store().get_by_disk(target.disk_index).await?;
        support::ensure(
            recorded.iter().any(|m| m.partition == target.partition),
            "mount was not recorded",
        )?;

        unmount(&registry, &target, ctx).await?;
        let recorded = registry.store().get_by_disk(target.disk_index).await?;
        support::ensure(recorded.is_empty(), "records survived the unmount")
    }
}

pub struct MountIdempotent;

#[async_trait]
impl HarnessTest for MountIdempotent {
    fn id(&self) -> &'static str {
        "mount.idempotent"
    }

    fn suite(&self) -> &'static str {
        "mount"
    }

    async fn execute(&self, ctx: &HarnessContext) -> Result<()> {
        let (registry, target) = prepare(self.id())?;
        let request = mount_request(&target);

        let first = registry.mount().mount_and_map(&request, &ctx.cancel).await;
        support::ensure(first.success, format!("first mount failed: {:?}", first.error_message))?;
        let second = registry.mount().mount_and_map(&request, &ctx.cancel).await;
        let outcome = support::ensure(
            second.success && second.reused_existing,
            format!(
                "second mount was not reused: success={} error={:?}",
                second.success, second.error_message
            ),
        )
        .and(support::ensure(
            first.external_path == second.external_path,
            "share path changed between mounts",
        ));

        unmount(&registry, &target, ctx).await?;
        outcome
    }
}

pub struct ReconcileIdempotent;

#[async_trait]
impl HarnessTest for ReconcileIdempotent {
    fn id(&self) -> &'static str {
        "reconcile.idempotent"
    }

    fn suite(&self) -> &'static str {
        "state"
    }

    fn destructive(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: &HarnessContext) -> Result<()> {
        let registry = support::registry()?;
        let store = registry.store();
        store.reconcile().await?;
        let removed = store.reconcile().await?;
        support::ensure(
            removed.is_empty(),
            format!("second reconcile removed {} record(s)", removed.len()),
        )
    }
}

pub struct UnmountIdempotent;

#[async_trait]
impl HarnessTest for UnmountIdempotent {
    fn id(&self) -> &'static str {
        "unmount.idempotent"
    }

    fn suite(&self) -> &'static str {
        "mount"
    }

    async fn execute(&self, ctx: &HarnessContext) -> Result<()> {
        let (registry, target) = prepare(self.id())?;
        unmount(&registry, &target, ctx).await?;
        unmount(&registry, &target, ctx).await
    }
}
