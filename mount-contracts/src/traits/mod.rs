// SPDX-License-Identifier: GPL-3.0-only

pub mod command;
pub mod discovery;
pub mod probe;

pub use command::CommandRunner;
pub use discovery::{DiskEnumerator, DriveLetterProvider};
pub use probe::PathProbe;
