// SPDX-License-Identifier: GPL-3.0-only

//! Fakes for the contract traits, shared by the unit tests of this crate

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use mount_contracts::{BridgeError, CommandRunner, DriveLetterProvider, PathProbe};
use mount_types::{CommandRequest, CommandResponse, DriveLetter};
use tokio_util::sync::CancellationToken;

static COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "mount-service-{label}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Scripted [`CommandRunner`]: queued responses per command, `STATUS=OK` otherwise
#[derive(Default)]
pub struct FakeRunner {
    queued: Mutex<HashMap<String, VecDeque<Result<CommandResponse, BridgeError>>>>,
    hanging: Mutex<HashSet<String>>,
    calls: Mutex<Vec<CommandRequest>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, response: CommandResponse) -> &Self {
        self.respond_with(command, Ok(response))
    }

    pub fn respond_with(&self, command: &str, response: Result<CommandResponse, BridgeError>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Calls to `command` never finish on their own; only cancellation ends them
    pub fn hang(&self, command: &str) -> &Self {
        self.hanging.lock().unwrap().insert(command.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, command: &str) -> Vec<CommandRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.command == command)
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.command).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse, BridgeError> {
        let command = request.command.clone();
        self.calls.lock().unwrap().push(request);

        let hangs = self.hanging.lock().unwrap().contains(&command);
        if hangs {
            cancel.cancelled().await;
            return Err(BridgeError::cancelled(format!("{command} cancelled")));
        }

        // Let concurrent callers interleave like a real process would.
        tokio::task::yield_now().await;

        let next = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&command)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(CommandResponse::ok()))
    }
}

/// [`PathProbe`] over an in-memory set of paths
#[derive(Default)]
pub struct FakeProbe {
    existing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &str) {
        self.existing.lock().unwrap().insert(path.to_string());
    }

    pub fn hang(&self, path: &str) {
        self.hanging.lock().unwrap().insert(path.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PathProbe for FakeProbe {
    async fn exists(&self, path: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hangs = self.hanging.lock().unwrap().contains(path);
        if hangs {
            std::future::pending::<()>().await;
        }
        self.existing.lock().unwrap().contains(path)
    }
}

/// [`DriveLetterProvider`] over a settable list
#[derive(Default)]
pub struct FakeLetters {
    used: Mutex<Vec<DriveLetter>>,
    failing: Mutex<bool>,
}

impl FakeLetters {
    pub fn new(letters: &[char]) -> Self {
        let provider = Self::default();
        provider.set(letters_of(letters));
        provider
    }

    pub fn set(&self, letters: Vec<DriveLetter>) {
        *self.used.lock().unwrap() = letters;
    }

    pub fn bind(&self, letter: char) {
        if let Some(letter) = DriveLetter::new(letter) {
            self.used.lock().unwrap().push(letter);
        }
    }

    pub fn release(&self, letter: char) {
        self.used
            .lock()
            .unwrap()
            .retain(|bound| Some(*bound) != DriveLetter::new(letter));
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

pub fn letters_of(letters: &[char]) -> Vec<DriveLetter> {
    letters.iter().filter_map(|c| DriveLetter::new(*c)).collect()
}

#[async_trait]
impl DriveLetterProvider for FakeLetters {
    async fn list_used_letters(&self) -> Result<Vec<DriveLetter>, BridgeError> {
        if *self.failing.lock().unwrap() {
            return Err(BridgeError::new(
                mount_contracts::BridgeErrorKind::Unavailable,
                "letter query failed",
            ));
        }
        Ok(self.used.lock().unwrap().clone())
    }
}

pub fn letter(c: char) -> DriveLetter {
    DriveLetter::new(c).expect("valid test letter")
}
