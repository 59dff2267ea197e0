// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant, timeout};

use crate::cases::{self, HarnessContext, TestRef};
use crate::errors::{Result, TestingError};

const CASE_TIMEOUT_ENV: &str = "BRIDGE_TESTING_CASE_TIMEOUT_SECS";

#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub suite: Option<String>,
    pub case_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub suite: String,
    pub status: CaseStatus,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub cases: Vec<CaseRecord>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.cases
            .iter()
            .any(|case| matches!(case.status, CaseStatus::Failed(_)))
    }

    pub fn count(&self, predicate: impl Fn(&CaseStatus) -> bool) -> usize {
        self.cases.iter().filter(|case| predicate(&case.status)).count()
    }
}

fn case_timeout() -> Duration {
    let secs = std::env::var(CASE_TIMEOUT_ENV)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

async fn execute_case(test: TestRef, ctx: &HarnessContext) -> CaseRecord {
    println!("[{}] START {}", test.suite(), test.id());
    let started = Instant::now();
    let limit = case_timeout();

    let status = match timeout(limit, test.execute(ctx)).await {
        Ok(Ok(())) => CaseStatus::Passed,
        Ok(Err(TestingError::TestSkipped { reason })) => CaseStatus::Skipped(reason),
        Ok(Err(error)) => CaseStatus::Failed(error.to_string()),
        Err(_) => {
            // Whatever the case was waiting on should stop too.
            ctx.cancel.cancel();
            CaseStatus::Failed(format!("timed out after {}s", limit.as_secs()))
        }
    };

    let elapsed = started.elapsed().as_millis();
    match &status {
        CaseStatus::Passed => println!("[{}] PASS {} ({} ms)", test.suite(), test.id(), elapsed),
        CaseStatus::Skipped(reason) => {
            println!("[{}] SKIP {} ({} ms): {}", test.suite(), test.id(), elapsed, reason)
        }
        CaseStatus::Failed(reason) => {
            println!("[{}] FAIL {} ({} ms): {}", test.suite(), test.id(), elapsed, reason)
        }
    }

    CaseRecord {
        id: test.id().to_string(),
        suite: test.suite().to_string(),
        status,
        elapsed_ms: elapsed,
    }
}

/// Cases matching `config`, in registration order
pub fn select(config: &RunConfig) -> Result<Vec<TestRef>> {
    let selected: Vec<TestRef> = cases::instantiate_tests()
        .into_iter()
        .filter(|test| config.case_id.as_deref().is_none_or(|id| test.id() == id))
        .filter(|test| config.suite.as_deref().is_none_or(|suite| test.suite() == suite))
        .collect();

    if selected.is_empty()
        && let Some(id) = &config.case_id
    {
        return Err(TestingError::UnknownCase { id: id.clone() });
    }
    Ok(selected)
}

/// Run the selected cases one after another; they share the target disk
pub async fn run(config: &RunConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    for test in select(config)? {
        let ctx = HarnessContext::default();
        summary.cases.push(execute_case(test, &ctx).await);
    }
    Ok(summary)
}
