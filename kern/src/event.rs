// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event wait table.
//!
//! Exactly one slot per hardware event source. Each event has, by
//! convention, a single notifier task; a second concurrent `AwaitEvent` on
//! the same source is a state-machine bug and halts the kernel.

use abi::{EventId, TaskId, NUM_EVENTS};

pub struct EventTable {
    slots: [Option<TaskId>; NUM_EVENTS],
}

impl EventTable {
    pub fn new() -> Self {
        Self {
            slots: [None; NUM_EVENTS],
        }
    }

    /// Records `waiter` as the task blocked on `event`.
    pub fn wait(&mut self, event: EventId, waiter: TaskId) {
        let slot = &mut self.slots[event.index()];
        if let Some(existing) = *slot {
            kcrash!(
                "tasks {} and {} both awaiting event {:?}",
                existing.0,
                waiter.0,
                event
            );
        }
        *slot = Some(waiter);
    }

    /// Removes and returns the task waiting on `event`, if any.
    pub fn take(&mut self, event: EventId) -> Option<TaskId> {
        self.slots[event.index()].take()
    }

    pub fn has_waiter(&self, event: EventId) -> bool {
        self.slots[event.index()].is_some()
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::new()
    }
}
