// SPDX-License-Identifier: GPL-3.0-only

pub mod protocol;
pub mod traits;

pub use protocol::{BridgeError, BridgeErrorKind};
pub use traits::{CommandRunner, DiskEnumerator, DriveLetterProvider, PathProbe};
