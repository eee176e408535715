// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multi-level ready queue.
//!
//! One FIFO per priority level; ties within a level break strictly FIFO.
//! This is a pure data structure: it does not inspect task state and
//! trusts the kernel to enqueue only runnable tasks. A task appears in at
//! most one queue at a time.

use abi::{Priority, TaskId, MAX_TASKS, NUM_PRIORITIES};
use heapless::Deque;

pub struct Scheduler {
    ready: [Deque<TaskId, MAX_TASKS>; NUM_PRIORITIES],
}

impl Scheduler {
    pub fn new() -> Self {
        const EMPTY: Deque<TaskId, MAX_TASKS> = Deque::new();
        Self {
            ready: [EMPTY; NUM_PRIORITIES],
        }
    }

    /// Appends a task to the tail of its priority level.
    pub fn add_task(&mut self, priority: Priority, id: TaskId) {
        if self.ready[usize::from(priority.0)].push_back(id).is_err() {
            // Each task is in at most one queue, so a full queue means the
            // kernel enqueued something twice.
            kcrash!("ready queue overflow at priority {}", priority.0);
        }
    }

    /// Re-inserts a task at the head of its priority level. Used for tasks
    /// whose suspension was involuntary, so that taking an interrupt does
    /// not cost them their position.
    pub fn add_task_front(&mut self, priority: Priority, id: TaskId) {
        if self.ready[usize::from(priority.0)].push_front(id).is_err() {
            kcrash!("ready queue overflow at priority {}", priority.0);
        }
    }

    /// Removes and returns the head of the highest-priority non-empty
    /// queue, or `None` if every level is empty.
    pub fn get_next(&mut self) -> Option<TaskId> {
        self.ready.iter_mut().find_map(|queue| queue.pop_front())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
