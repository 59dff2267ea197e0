// SPDX-License-Identifier: GPL-3.0-only

//! Flat key/value result protocol spoken by the external scripts

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const STATUS_KEY: &str = "STATUS";
pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

const ERROR_MESSAGE_KEY: &str = "ErrorMessage";
const ERROR_CODE_KEY: &str = "ErrorCode";
const ERROR_HINT_KEY: &str = "ErrorHint";
const DMESG_KEY: &str = "DmesgTail";

/// A named script invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// Ordered `-Key Value` pairs
    pub args: Vec<(String, String)>,
    pub elevated: bool,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            elevated: false,
        }
    }

    pub fn elevated(command: impl Into<String>) -> Self {
        Self {
            elevated: true,
            ..Self::new(command)
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((key.into(), value.to_string()));
        self
    }

    pub fn arg_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.arg(key, value),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for (key, value) in &self.args {
            write!(f, " -{} {}", key, value)?;
        }
        if self.elevated {
            write!(f, " (elevated)")?;
        }
        Ok(())
    }
}

/// Parsed `Key=Value` output of a script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    values: BTreeMap<String, String>,
}

impl CommandResponse {
    /// Parse script output. Lines without `=` are ignored and later keys win.
    ///
    /// Output with no `STATUS` line becomes an `ERROR` response so callers
    /// never have to special-case a truncated or garbled run.
    pub fn parse(output: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in output.lines() {
            let line = line.trim_end_matches('\r');
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.trim().to_string());
        }

        let mut response = Self { values };
        if response.status().is_none() {
            response.set(STATUS_KEY, STATUS_ERROR);
            if response.get(ERROR_MESSAGE_KEY).is_none() {
                response.set(ERROR_MESSAGE_KEY, "Command produced no STATUS line");
            }
        }
        response
    }

    pub fn ok() -> Self {
        let mut response = Self::default();
        response.set(STATUS_KEY, STATUS_OK);
        response
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut response = Self::default();
        response.set(STATUS_KEY, STATUS_ERROR);
        response.set(ERROR_MESSAGE_KEY, message.into());
        response
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| {
            matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        })
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_KEY)
    }

    pub fn is_ok(&self) -> bool {
        self.status()
            .is_some_and(|status| status.eq_ignore_ascii_case(STATUS_OK))
    }

    pub fn error_message(&self) -> Option<&str> {
        self.get(ERROR_MESSAGE_KEY)
    }

    pub fn error_code(&self) -> Option<&str> {
        self.get(ERROR_CODE_KEY)
    }

    pub fn error_hint(&self) -> Option<&str> {
        self.get(ERROR_HINT_KEY)
    }

    /// `"<hint> Details: <message>"` when a hint exists, else the message
    pub fn display_error(&self) -> String {
        enrich_message(
            self.error_hint(),
            self.error_message().unwrap_or("Command failed without an error message"),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn enrich_message(hint: Option<&str>, message: &str) -> String {
    match hint {
        Some(hint) => format!("{} Details: {}", hint, message),
        None => message.to_string(),
    }
}

/// Outcome of a mount command, with the diagnostics used for retry decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResult {
    pub success: bool,
    pub external_path: Option<String>,
    pub internal_path: Option<String>,
    pub distribution: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub error_hint: Option<String>,
    pub dmesg_excerpt: Option<String>,
    pub already_mounted: bool,
    pub share_verified: bool,
}

impl MountResult {
    pub fn from_response(response: &CommandResponse) -> Self {
        let owned = |key: &str| response.get(key).map(str::to_string);
        let success = response.is_ok();
        Self {
            success,
            external_path: owned("UNC"),
            internal_path: owned("MountPath"),
            distribution: owned("Distro"),
            error_message: if success {
                None
            } else {
                Some(
                    response
                        .error_message()
                        .unwrap_or("Mount command failed without an error message")
                        .to_string(),
                )
            },
            error_code: owned(ERROR_CODE_KEY),
            error_hint: owned(ERROR_HINT_KEY),
            dmesg_excerpt: owned(DMESG_KEY),
            already_mounted: response.get_bool("AlreadyMounted"),
            share_verified: response.get_bool("UncVerified"),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Weight of the diagnostics this result carries
    ///
    /// Error code outranks hint, which outranks kernel-log excerpt, which
    /// outranks a bare message.
    pub fn diagnostic_score(&self) -> u32 {
        let mut score = 0;
        if self.error_code.is_some() {
            score += 8;
        }
        if self.error_hint.is_some() {
            score += 4;
        }
        if self.dmesg_excerpt.is_some() {
            score += 2;
        }
        if self.error_message.is_some() {
            score += 1;
        }
        score
    }

    pub fn display_error(&self) -> String {
        let message = self
            .error_message
            .as_deref()
            .unwrap_or("Mount command failed without an error message");
        enrich_message(self.error_hint.as_deref(), message)
    }

    pub fn has_external_path(&self) -> bool {
        self.external_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_output() {
        let output = "noise line\r\nSTATUS=OK\r\nUNC=\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE1p2\r\nMountPath=/mnt/wsl/PHYSICALDRIVE1p2\nAlreadyMounted=True\nExtra=a=b\n";
        let response = CommandResponse::parse(output);
        assert!(response.is_ok());
        assert_eq!(response.get("Extra"), Some("a=b"));

        let mount = MountResult::from_response(&response);
        assert!(mount.success);
        assert!(mount.already_mounted);
        assert!(!mount.share_verified);
        assert_eq!(
            mount.external_path.as_deref(),
            Some("\\\\wsl.localhost\\Ubuntu\\mnt\\wsl\\PHYSICALDRIVE1p2")
        );
        assert_eq!(mount.internal_path.as_deref(), Some("/mnt/wsl/PHYSICALDRIVE1p2"));
        assert!(mount.error_message.is_none());
    }

    #[test]
    fn missing_status_becomes_error() {
        let response = CommandResponse::parse("UNC=x\n");
        assert!(!response.is_ok());
        assert_eq!(response.status(), Some(STATUS_ERROR));
        assert_eq!(response.error_message(), Some("Command produced no STATUS line"));
    }

    #[test]
    fn hint_enriches_error_text() {
        let response = CommandResponse::error("mount: wrong fs type")
            .with("ErrorHint", "Install xfsprogs in the distribution.");
        assert_eq!(
            response.display_error(),
            "Install xfsprogs in the distribution. Details: mount: wrong fs type"
        );
        assert_eq!(
            CommandResponse::error("plain").display_error(),
            "plain"
        );
    }

    #[test]
    fn diagnostic_score_prefers_error_codes() {
        let coded = MountResult {
            error_code: Some("EINVAL".to_string()),
            ..MountResult::failed("a")
        };
        let hinted = MountResult {
            error_hint: Some("try auto".to_string()),
            dmesg_excerpt: Some("[  1.0] bad superblock".to_string()),
            ..MountResult::failed("b")
        };
        assert!(coded.diagnostic_score() > hinted.diagnostic_score());
        assert!(hinted.diagnostic_score() > MountResult::failed("c").diagnostic_score());
    }

    #[test]
    fn request_renders_arguments() {
        let request = CommandRequest::elevated("mount-disk")
            .arg("DiskIndex", 1)
            .arg_opt("Distro", None::<String>)
            .arg("FsType", "ext4");
        assert_eq!(request.get("DiskIndex"), Some("1"));
        assert_eq!(request.to_string(), "mount-disk -DiskIndex 1 -FsType ext4 (elevated)");
    }
}
