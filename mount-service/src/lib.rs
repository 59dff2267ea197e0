// SPDX-License-Identifier: GPL-3.0-only

//! Orchestration core of the WSL disk bridge
//!
//! Mounts a physical disk partition into a WSL distribution, waits for its
//! share path to become reachable from the host, then exposes it as a
//! network location or a mapped drive letter. Active mounts are persisted
//! so they can be reconciled against the live system later.

pub mod access;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod state;

#[cfg(test)]
mod testing;

pub use access::{AccessFailure, AccessSurfaceService};
pub use config::BridgeConfig;
pub use error::{Result, ServiceError};
pub use orchestrator::{
    MountOrchestrator, MountRequest, MountSettings, UnmountOrchestrator, UnmountRequest,
    VerifyPolicy,
};
pub use registry::{HostAdapters, ServiceRegistry};
pub use state::MountStateStore;
