// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microkernel for the train-control system.
//!
//! The kernel is a state-machine reactor: its only loop is
//! `schedule -> activate -> handle`. Each activation hands the virtual CPU
//! to exactly one task; the task runs until it re-enters the kernel through
//! a system call, and pending board interrupts are taken at activation
//! boundaries. All kernel structures are touched only while no task is
//! active, so there is no locking anywhere in the dispatch path.
//!
//! # Algorithm naivety
//!
//! This implementation uses deliberately naive algorithms: linear scans
//! over the task table, fixed-capacity queues, no clever data structures.
//! The task count is small (at most [`abi::MAX_TASKS`]) and the simplicity
//! pays for itself in reviewability.
//!
//! # Execution substrate
//!
//! The context-switch mechanism lives behind the [`arch`] module. The
//! backend provided here runs each task body on a dedicated host thread
//! with a strict single-CPU handoff, which makes the whole system --
//! kernel, servers, reservation authority -- runnable under `cargo test`.
//! See `arch` for the contract.

/// Logs a diagnostic and halts the kernel. Reserved for conditions that
/// always indicate a kernel or server state-machine bug; these must be
/// observed, not masked.
macro_rules! kcrash {
    ($($t:tt)*) => {{
        log::error!($($t)*);
        panic!($($t)*);
    }};
}

pub mod arch;
pub mod board;
pub mod event;
pub mod sched;
pub mod startup;
pub mod stats;
pub mod syscalls;
pub mod task;

pub use crate::arch::Sys;
pub use crate::board::{BoardConfig, BoardHandle};
pub use crate::startup::{Kernel, KernelReport};
