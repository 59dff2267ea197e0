// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use mount_types::CommandRequest;
use serde::{Deserialize, Serialize};
use which::which;

use crate::error::{Result, SysError};

const HOST_CANDIDATES: [&str; 2] = ["powershell.exe", "pwsh"];

/// The interpreter that runs the bridge scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHost {
    pub program: PathBuf,
    /// Arguments placed before the script path
    #[serde(default)]
    pub args: Vec<String>,
    /// Flag introducing the script path, e.g. `-File`
    #[serde(default)]
    pub file_flag: Option<String>,
    pub extension: String,
    pub scripts_dir: PathBuf,
}

impl ScriptHost {
    /// PowerShell host with the usual non-interactive flags
    pub fn powershell(program: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
            ],
            file_flag: Some("-File".to_string()),
            extension: "ps1".to_string(),
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Locate PowerShell in PATH
    pub fn find_default(scripts_dir: impl Into<PathBuf>) -> Result<Self> {
        let program = HOST_CANDIDATES
            .iter()
            .find_map(|candidate| which(candidate).ok())
            .ok_or(SysError::ScriptHostNotFound)?;
        Ok(Self::powershell(program, scripts_dir))
    }

    pub fn script_path(&self, command: &str) -> PathBuf {
        self.scripts_dir
            .join(format!("{}.{}", command, self.extension))
    }

    pub fn require_script(&self, command: &str) -> Result<PathBuf> {
        let path = self.script_path(command);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SysError::ScriptNotFound(path))
        }
    }

    /// Full argument vector for a request, excluding the program itself
    pub fn command_args(&self, script: &Path, request: &CommandRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        if let Some(flag) = &self.file_flag {
            args.push(flag.into());
        }
        args.push(script.as_os_str().to_owned());
        for (key, value) in &request.args {
            args.push(format!("-{}", key).into());
            args.push(value.into());
        }
        args
    }
}

/// Quote a value for a single-quoted PowerShell string literal
pub(crate) fn powershell_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a value as one token inside a Start-Process argument string
pub(crate) fn argument_token(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\t', '"']) {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\\\""))
}
