// SPDX-License-Identifier: GPL-3.0-only

//! Retry, backoff and failure classification shared by the orchestrators

use std::sync::Arc;
use std::time::Duration;

use mount_contracts::PathProbe;
use mount_types::{CommandResponse, MountResult};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const INVALID_ARGUMENT_CODES: [&str; 3] = ["EINVAL", "INVALID_ARGUMENT", "WSL_E_INVALID_ARGUMENT"];

/// Codes that look like bad arguments but will fail the same way with `auto`
const NEVER_RETRY_CODES: [&str; 1] = ["XFS_UNSUPPORTED_FEATURES"];

const ALREADY_DETACHED_CODES: [&str; 3] = ["NOT_MOUNTED", "ALREADY_DETACHED", "WSL_E_DISK_NOT_ATTACHED"];
const ALREADY_DETACHED_PHRASES: [&str; 3] = ["not mounted", "not attached", "already detached"];

pub const AUTO_FS_TYPE: &str = "auto";

const JITTER: f64 = 0.2;
const MAX_BACKOFF_FACTOR: u32 = 8;

fn code_in(code: Option<&str>, list: &[&str]) -> bool {
    code.is_some_and(|code| list.iter().any(|known| known.eq_ignore_ascii_case(code.trim())))
}

/// Whether a failed mount should be retried once with fstype `auto`
pub fn should_retry_with_auto(result: &MountResult, fs_type: &str) -> bool {
    if result.success || fs_type.trim().eq_ignore_ascii_case(AUTO_FS_TYPE) {
        return false;
    }
    let code = result.error_code.as_deref();
    if code_in(code, &NEVER_RETRY_CODES) {
        return false;
    }
    code_in(code, &INVALID_ARGUMENT_CODES)
        || result
            .error_message
            .as_deref()
            .is_some_and(|message| message.to_lowercase().contains("invalid argument"))
}

/// Whether an unmount failure just means there was nothing to detach
pub fn is_already_detached(response: &CommandResponse) -> bool {
    if response.is_ok() {
        return false;
    }
    if code_in(response.error_code(), &ALREADY_DETACHED_CODES) {
        return true;
    }
    response.error_message().is_some_and(|message| {
        let message = message.to_lowercase();
        ALREADY_DETACHED_PHRASES
            .iter()
            .any(|phrase| message.contains(phrase))
    })
}

/// Pick the failed attempt with richer diagnostics; ties keep `first`
pub fn more_informative(first: MountResult, second: MountResult) -> MountResult {
    if second.diagnostic_score() > first.diagnostic_score() {
        second
    } else {
        first
    }
}

/// Combined failure for a mount that failed with the hint and again with `auto`
pub fn merge_retry_failure(
    fs_type: &str,
    first: MountResult,
    retry: MountResult,
) -> MountResult {
    let details = format!(
        "Mount with fstype '{}' failed: {}; retry with fstype '{}' failed: {}",
        fs_type,
        first.display_error(),
        AUTO_FS_TYPE,
        retry.display_error()
    );
    let mut chosen = more_informative(first, retry);
    chosen.error_message = Some(details);
    // The hint is already folded into the combined message.
    chosen.error_hint = None;
    chosen
}

/// Backoff settings for share verification
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for each single existence probe
    pub probe_timeout: Duration,
}

impl VerifyPolicy {
    /// Delay before attempt `attempt + 1`; `attempt` counts from 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(16);
        let nominal = base * f64::from(1u32 << exponent);
        let jitter = rand::thread_rng().gen_range(-JITTER..=JITTER);
        let ceiling = base * f64::from(MAX_BACKOFF_FACTOR);
        Duration::from_secs_f64((nominal * (1.0 + jitter)).clamp(0.0, ceiling))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { attempts: u32 },
    Exhausted { attempts: u32 },
    Cancelled,
}

/// Poll `path` until it exists, the attempts run out, or `cancel` fires
pub async fn verify_share(
    probe: &Arc<dyn PathProbe>,
    path: &str,
    policy: VerifyPolicy,
    cancel: &CancellationToken,
) -> VerifyOutcome {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        let exists = tokio::select! {
            _ = cancel.cancelled() => return VerifyOutcome::Cancelled,
            checked = tokio::time::timeout(policy.probe_timeout, probe.exists(path)) => {
                checked.unwrap_or_else(|_| {
                    debug!("Probe of {} timed out after {:?}", path, policy.probe_timeout);
                    false
                })
            }
        };
        if exists {
            return VerifyOutcome::Verified { attempts: attempt };
        }
        if attempt == attempts {
            break;
        }

        let delay = policy.backoff(attempt);
        warn!(
            "Share {} not reachable (attempt {}/{}), retrying in {:?}",
            path, attempt, attempts, delay
        );
        tokio::select! {
            _ = cancel.cancelled() => return VerifyOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    VerifyOutcome::Exhausted { attempts }
}
