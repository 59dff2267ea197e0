// SPDX-License-Identifier: GPL-3.0-only

//! Mount and unmount workflows
//!
//! Both orchestrators return result values for every expected failure and
//! tag them with the step that failed. Nothing in here returns `Err`.

mod mount;
pub mod policy;
mod unmount;

use mount_types::CommandRequest;

pub use mount::{MountOrchestrator, MountRequest, MountSettings};
pub use policy::VerifyPolicy;
pub use unmount::{UnmountOrchestrator, UnmountRequest};

pub const MOUNT_DISK: &str = "mount-disk";
pub const UNMOUNT_DISK: &str = "unmount-disk";

const CANCELLED_MESSAGE: &str = "Operation was cancelled";

fn unmount_command(disk_index: u32) -> CommandRequest {
    CommandRequest::elevated(UNMOUNT_DISK).arg("DiskIndex", disk_index)
}
