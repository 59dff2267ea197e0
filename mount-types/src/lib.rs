// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the WSL disk bridge
//!
//! These types are shared by every layer of the stack:
//!
//! - **mount-sys**: parses command output into [`CommandResponse`] and [`MountResult`]
//! - **mount-service**: persists [`ActiveMount`] records and returns
//!   [`MountAndMapResult`] / [`UnmountAndUnmapResult`] to callers
//! - **mount-testing**: asserts on the same result values end-to-end
//!
//! Nothing in this crate performs I/O.

pub mod access;
pub mod command;
pub mod disk;
pub mod mount;
pub mod results;

pub use access::{AccessInfo, AccessMode, AccessRequest, DriveLetter, sanitize_surface_name};
pub use command::{CommandRequest, CommandResponse, MountResult, STATUS_ERROR, STATUS_KEY, STATUS_OK};
pub use disk::{DiskInfo, PartitionInfo};
pub use mount::{ActiveMount, MountKey};
pub use results::{FailedStep, MountAndMapResult, UnmountAndUnmapResult};
