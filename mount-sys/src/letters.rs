// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use mount_contracts::{BridgeError, BridgeErrorKind, CommandRunner, DriveLetterProvider};
use mount_types::{CommandRequest, DriveLetter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LIST_LETTERS_COMMAND: &str = "list-letters";
const LETTERS_KEY: &str = "Letters";

/// [`DriveLetterProvider`] backed by the `list-letters` script
///
/// The script reports the host's drive table (`STATUS=OK` plus
/// `Letters=C,D,X`), so a letter mapped to a share that is currently
/// unreachable still counts as used.
#[derive(Clone)]
pub struct ScriptLetterProvider {
    runner: Arc<dyn CommandRunner>,
}

impl ScriptLetterProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DriveLetterProvider for ScriptLetterProvider {
    async fn list_used_letters(&self) -> Result<Vec<DriveLetter>, BridgeError> {
        let response = self
            .runner
            .run(CommandRequest::new(LIST_LETTERS_COMMAND), &CancellationToken::new())
            .await?;

        if !response.is_ok() {
            return Err(BridgeError::new(
                BridgeErrorKind::CommandFailed,
                format!("Failed to list drive letters: {}", response.display_error()),
            ));
        }

        let mut letters = parse_letters(response.get(LETTERS_KEY).unwrap_or_default())?;
        letters.sort();
        letters.dedup();
        debug!("Host reports {} used drive letters", letters.len());
        Ok(letters)
    }
}

/// Accepts `C`, `C:` or `C:\` separated by commas or whitespace
fn parse_letters(raw: &str) -> Result<Vec<DriveLetter>, BridgeError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|token| token.trim_end_matches(['\\', ':']))
        .filter(|token| !token.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => DriveLetter::new(c),
                _ => None,
            }
            .ok_or_else(|| {
                BridgeError::new(
                    BridgeErrorKind::Internal,
                    format!("Unexpected drive letter '{}' in letter list", token),
                )
            })
        })
        .collect()
}
