// SPDX-License-Identifier: GPL-3.0-only

pub mod orchestrator;
pub mod support;

pub use orchestrator::{CaseRecord, CaseStatus, RunConfig, RunSummary, run};
