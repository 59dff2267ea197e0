// SPDX-License-Identifier: GPL-3.0-only

//! Host-side operations for the WSL disk bridge
//!
//! This crate owns everything that touches the host directly:
//! - Spawning the mount/access scripts, elevated or not
//! - Observing elevated completion through a polled result file
//! - Probing share paths
//! - Enumerating candidate disks and used drive letters through inventory scripts
//!
//! Orchestration logic lives in `mount-service` and only sees the
//! contracts from `mount-contracts`.

pub mod disks;
pub mod error;
pub mod host;
pub mod letters;
pub mod probe;
pub mod runner;

pub use disks::ScriptDiskEnumerator;
pub use error::{Result, SysError};
pub use host::ScriptHost;
pub use letters::ScriptLetterProvider;
pub use probe::FsPathProbe;
pub use runner::{RunnerSettings, ScriptRunner};
