// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mount_types::{CommandRequest, CommandResponse};

use crate::BridgeError;

/// Runs a named external command and returns its flat key/value result
///
/// `Err` is reserved for failures of the boundary itself (spawn failure,
/// timeout, cancellation). A command that ran and reported `STATUS=ERROR`
/// comes back as `Ok` with that response. How completion of an elevated
/// command is observed is an implementation detail of the runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse, BridgeError>;
}
