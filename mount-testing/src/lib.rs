// SPDX-License-Identifier: GPL-3.0-only

pub mod cases;
pub mod errors;
pub mod harness;
