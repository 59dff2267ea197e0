// SPDX-License-Identifier: GPL-3.0-only

//! Script execution behind the command boundary
//!
//! Unprivileged scripts print their `Key=Value` result on stdout. Elevated
//! scripts run in a separate, UAC-elevated process whose stdout we cannot
//! read, so they receive an extra `-ResultFile` argument and write their
//! result there; completion is observed by polling that file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mount_contracts::{BridgeError, CommandRunner};
use mount_types::{CommandRequest, CommandResponse, STATUS_KEY};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SysError};
use crate::host::{ScriptHost, argument_token, powershell_literal};

const RESULT_PREFIX: &str = "wsl-disk-bridge-";
const RESULT_SUFFIX: &str = ".result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Ceiling for a single command, elevated or not
    pub command_timeout: Duration,
    /// How often the elevated result file is checked
    pub poll_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// [`CommandRunner`] that spawns scripts through a [`ScriptHost`]
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    host: ScriptHost,
    settings: RunnerSettings,
    results_dir: PathBuf,
    /// Set once the results dir has been swept of abandoned files
    swept: OnceCell<()>,
}

impl ScriptRunner {
    pub fn new(host: ScriptHost, settings: RunnerSettings) -> Self {
        Self {
            host,
            settings,
            results_dir: std::env::temp_dir(),
            swept: OnceCell::new(),
        }
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    /// Delete result files older than `max_age` from the results dir
    ///
    /// An elevated script keeps running after its caller cancels or times
    /// out, so it can write its result file after nobody is waiting for it.
    pub async fn sweep_stale_results(&self, max_age: Duration) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.results_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Could not scan {:?} for stale results: {}", self.results_dir, e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(RESULT_PREFIX) || !name.ends_with(RESULT_SUFFIX) {
                continue;
            }
            let age = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified.elapsed().unwrap_or_default(),
                Err(_) => continue,
            };
            if age >= max_age && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {} stale elevated result file(s)", removed);
        }
        removed
    }

    async fn run_unprivileged(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse> {
        let script = self.host.require_script(&request.command)?;
        let args = self.host.command_args(&script, request);

        let child = Command::new(&self.host.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SysError::OperationFailed(format!("Failed to spawn {}: {}", request.command, e))
            })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => return Err(SysError::Cancelled(request.command.clone())),
            _ = tokio::time::sleep(self.settings.command_timeout) => {
                return Err(SysError::Timeout(self.settings.command_timeout, request.command.clone()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let has_status = stdout
            .lines()
            .any(|line| line.trim_start().starts_with(&format!("{}=", STATUS_KEY)));

        if !output.status.success() && !has_status {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} exited with {}: {}", request.command, output.status, stderr.trim());
            let message = if stderr.trim().is_empty() {
                format!("{} exited with {}", request.command, output.status)
            } else {
                stderr.trim().to_string()
            };
            return Ok(CommandResponse::error(message));
        }

        Ok(CommandResponse::parse(&stdout))
    }

    async fn run_elevated(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse> {
        let script = self.host.require_script(&request.command)?;
        self.swept
            .get_or_init(|| async {
                self.sweep_stale_results(self.settings.command_timeout).await;
            })
            .await;
        let result_file = self.results_dir.join(format!(
            "{}{}{}",
            RESULT_PREFIX,
            uuid::Uuid::new_v4(),
            RESULT_SUFFIX
        ));

        let mut inner: Vec<String> = self
            .host
            .command_args(&script, request)
            .iter()
            .map(|arg| argument_token(&arg.to_string_lossy()))
            .collect();
        inner.push("-ResultFile".to_string());
        inner.push(argument_token(&result_file.to_string_lossy()));

        let launch = format!(
            "Start-Process -FilePath {} -Verb RunAs -WindowStyle Hidden -ArgumentList {}",
            powershell_literal(&self.host.program.to_string_lossy()),
            powershell_literal(&inner.join(" "))
        );

        debug!("Launching elevated {}", request);
        let mut launcher = Command::new(&self.host.program);
        launcher
            .args(["-NoProfile", "-NonInteractive", "-Command", launch.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let deadline = Instant::now() + self.settings.command_timeout;
        let output = tokio::select! {
            output = launcher.output() => output?,
            _ = cancel.cancelled() => {
                abandoned(request, &result_file);
                return Err(SysError::Cancelled(request.command.clone()));
            }
            _ = tokio::time::sleep_until(deadline) => {
                abandoned(request, &result_file);
                return Err(SysError::Timeout(self.settings.command_timeout, request.command.clone()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Elevation of {} failed: {}", request.command, stderr.trim());
            return Ok(CommandResponse::error(format!(
                "Elevation was declined or failed: {}",
                stderr.trim()
            )));
        }

        let response = wait_for_result_file(
            &result_file,
            self.settings.poll_interval,
            deadline,
            cancel,
        )
        .await;

        if let Err(e) = tokio::fs::remove_file(&result_file).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!("Could not remove result file {:?}: {}", result_file, e);
        }
        if let Err(SysError::Timeout(..) | SysError::Cancelled(_)) = &response {
            abandoned(request, &result_file);
        }

        response.map_err(|err| match err {
            SysError::Timeout(duration, _) => SysError::Timeout(duration, request.command.clone()),
            SysError::Cancelled(_) => SysError::Cancelled(request.command.clone()),
            other => other,
        })
    }
}

fn abandoned(request: &CommandRequest, result_file: &Path) {
    warn!(
        "Stopped waiting for elevated {}; a late result may still appear at {:?}",
        request.command, result_file
    );
}

/// Poll `path` until it holds a `STATUS` line, the deadline passes, or `cancel` fires
pub(crate) async fn wait_for_result_file(
    path: &Path,
    poll_interval: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<CommandResponse> {
    let started = Instant::now();
    loop {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if has_status_line(&content) => {
                return Ok(CommandResponse::parse(&content));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SysError::Io(e)),
        }

        if Instant::now() >= deadline {
            return Err(SysError::Timeout(started.elapsed(), path.display().to_string()));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(SysError::Cancelled(path.display().to_string())),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

fn has_status_line(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.trim_start().starts_with(&format!("{}=", STATUS_KEY)))
}

#[async_trait]
impl CommandRunner for ScriptRunner {
    async fn run(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<CommandResponse, BridgeError> {
        if cancel.is_cancelled() {
            return Err(BridgeError::cancelled(format!("{} cancelled before start", request.command)));
        }

        info!("Running {}", request);
        let response = if request.elevated {
            self.run_elevated(&request, cancel).await
        } else {
            self.run_unprivileged(&request, cancel).await
        }?;

        if response.is_ok() {
            debug!("{} completed: STATUS=OK", request.command);
        } else {
            warn!("{} reported error: {}", request.command, response.display_error());
        }
        Ok(response)
    }
}
