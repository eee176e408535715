// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel counters. The idle-tick counter realizes the "implicit idle
//! task" of the scheduling model: time the CPU spends with no runnable
//! task is accounted here rather than burned in a busy loop.

use abi::NUM_SYSCALLS;

#[derive(Clone, Debug, Default)]
pub struct KernelStats {
    /// Task activations performed.
    pub dispatches: u64,
    /// System calls handled, by syscall number.
    pub syscalls: [u64; NUM_SYSCALLS],
    /// Interrupts delivered to event waiters.
    pub irqs_delivered: u64,
    /// Ticks of virtual time that passed with no runnable task.
    pub idle_ticks: u64,
    /// Tasks created over the life of the system.
    pub tasks_created: u64,
}

impl KernelStats {
    /// Idle time as a percentage of total virtual time, if any time has
    /// passed.
    pub fn idle_percent(&self, now: u64) -> Option<u64> {
        if now == 0 {
            None
        } else {
            Some(self.idle_ticks * 100 / now)
        }
    }
}
