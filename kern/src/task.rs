// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task descriptors and state transitions.

use abi::{Priority, TaskId, INBOX_DEPTH, MSG_CAPACITY};
use heapless::Deque;

use crate::arch::SavedState;

/// A message parked in a receiver's inbox. The bytes are owned by the inbox
/// from the moment the sender blocks until delivery; IPC data is always
/// copied, never referenced after the call that produced it.
pub struct Message {
    pub sender: TaskId,
    pub bytes: heapless::Vec<u8, MSG_CAPACITY>,
}

/// State used to make scheduling decisions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    /// Task can participate in scheduling, subject to `SchedState`.
    Healthy(SchedState),
    /// Task has exited. The slot, and the id naming it, are permanently
    /// retired.
    Zombie,
}

/// Scheduler parameters for a healthy task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedState {
    /// Task could be scheduled on the CPU.
    Runnable,
    /// Task is blocked waiting to deliver a message to the given task.
    InSend(TaskId),
    /// Task is blocked waiting for a reply from the given task.
    InReply(TaskId),
    /// Task is blocked waiting for a message, with an empty inbox.
    InRecv,
    /// Task is blocked in `AwaitEvent` on the given source.
    InAwait(abi::EventId),
}

/// Internal representation of a task.
pub struct Task {
    /// This task's id; also its index in the task table.
    pub id: TaskId,
    /// Id of the task that created this one, `None` for boot tasks.
    pub parent: Option<TaskId>,
    /// Priority, fixed at creation.
    pub priority: Priority,
    /// State used to make status and scheduling decisions.
    pub state: TaskState,
    /// Set when the task's most recent suspension was involuntary (an
    /// interrupt was taken while it was next in line). An interrupted task
    /// re-enters its ready queue at the head, keeping its position, and
    /// its next activation resumes it rather than completing a fresh
    /// system call.
    pub interrupted: bool,
    /// Messages sent to this task that it has not yet received. Invariant:
    /// empty whenever the task is `InRecv`.
    pub inbox: Deque<Message, INBOX_DEPTH>,
    /// Capacity of the reply buffer recorded at `Send` time; meaningful in
    /// `InSend` and `InReply`. Replies are truncated to this.
    pub reply_capacity: usize,
    /// Capacity of the receive buffer recorded when the task blocked in
    /// `Receive`; meaningful in `InRecv`.
    pub recv_capacity: usize,
    /// Saved activation state of the task: the return-value image that the
    /// next activation delivers, plus the architecture-side handle needed
    /// to resume it.
    pub save: SavedState,
}

impl Task {
    pub fn new(
        id: TaskId,
        parent: Option<TaskId>,
        priority: Priority,
        save: SavedState,
    ) -> Self {
        Self {
            id,
            parent,
            priority,
            state: TaskState::Healthy(SchedState::Runnable),
            interrupted: false,
            inbox: Deque::new(),
            reply_capacity: 0,
            recv_capacity: 0,
            save,
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.state == TaskState::Zombie
    }

    /// Replaces the scheduling state of a healthy task.
    ///
    /// # Panics
    ///
    /// If the task is a zombie; transitioning a dead task is always a
    /// kernel bug.
    pub fn set_healthy_state(&mut self, sched: SchedState) {
        match self.state {
            TaskState::Healthy(_) => self.state = TaskState::Healthy(sched),
            TaskState::Zombie => {
                kcrash!("state transition on zombie task {}", self.id.0)
            }
        }
    }

    /// True if the task is healthy and in the given state.
    pub fn is_in(&self, sched: SchedState) -> bool {
        self.state == TaskState::Healthy(sched)
    }
}

/// Checks a task id provided by user code against the table.
///
/// Returns the index on success. Ids that were never allocated and ids of
/// exited tasks both fail: callers cannot distinguish a task that is gone
/// from one that never was.
pub fn check_task_id_against_table(
    table: &[Task],
    id: TaskId,
) -> Result<usize, TaskIdError> {
    let index = id.index();
    if index >= table.len() {
        return Err(TaskIdError::NoSuchTask);
    }
    if table[index].is_zombie() {
        return Err(TaskIdError::NoSuchTask);
    }
    Ok(index)
}

/// Problems we might discover about user-provided task ids. Expressed to
/// the caller as a response code, never as a fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskIdError {
    NoSuchTask,
}

impl TaskIdError {
    pub fn code(self) -> i32 {
        match self {
            TaskIdError::NoSuchTask => abi::NO_SUCH_TASK,
        }
    }
}
