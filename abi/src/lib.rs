// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and task code.

use zerocopy::{AsBytes, FromBytes, Unaligned};

/// Number of distinct task priority levels. Priorities range over
/// `0..NUM_PRIORITIES`, lower numbers being more important.
pub const NUM_PRIORITIES: usize = 8;

/// Capacity of the task descriptor pool. Task ids are slot indices and are
/// never reused, so this bounds the number of `Create` calls over the life
/// of the system, not just the number of live tasks.
pub const MAX_TASKS: usize = 64;

/// Largest message that can cross the rendezvous in one piece. Longer
/// payloads are truncated silently, per the IPC contract.
pub const MSG_CAPACITY: usize = 512;

/// Depth of a task's inbox. Sized for the worst legitimate burst (a full
/// courier pool reporting in at once); overflowing it means senders
/// outnumber the receiver's service rate by an impossible margin and is
/// fatal.
pub const INBOX_DEPTH: usize = 64;

/// Name of a task-id slot. Ids are assigned sequentially at `Create` time
/// and permanently retired at `Exit`.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromBytes,
    AsBytes, Default,
)]
#[repr(transparent)]
pub struct TaskId(pub u16);

impl TaskId {
    /// Index into the task table.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Indicates priority of a task.
///
/// Priorities are small numbers starting from zero. Numerically lower
/// priorities are more important, so Priority 0 is the most likely to be
/// scheduled, followed by 1, and so forth.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, AsBytes, Unaligned, Default,
)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Checks if `self` is strictly more important than `other`.
    ///
    /// This is easier to read than comparing the numeric values of the
    /// priorities, since lower numbers are more important.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    pub fn is_valid(self) -> bool {
        usize::from(self.0) < NUM_PRIORITIES
    }
}

/// Conventional priority layering for the standard task set. Nothing in the
/// kernel depends on these; they keep the boot code and tests consistent.
pub mod priority {
    use super::Priority;

    pub const NOTIFIER: Priority = Priority(0);
    pub const SERVER_HIGH: Priority = Priority(1);
    pub const SERVER: Priority = Priority(2);
    pub const COURIER: Priority = Priority(3);
    pub const WORKER: Priority = Priority(4);
    pub const SUPERVISOR: Priority = Priority(5);
}

/// System call numbers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
#[repr(u32)]
pub enum Sysnum {
    Create = 0,
    MyTid = 1,
    MyParentTid = 2,
    Yield = 3,
    Exit = 4,
    Send = 5,
    Receive = 6,
    Reply = 7,
    AwaitEvent = 8,
    KernelPrint = 9,
}

/// Number of syscall slots, for per-syscall statistics.
pub const NUM_SYSCALLS: usize = 10;

/// Hardware event sources a task can wait on with `AwaitEvent`. Exactly one
/// task may wait on each source; by convention that task is the source's
/// notifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
#[repr(u32)]
pub enum EventId {
    TimerTick = 0,
    Uart0Rx = 1,
    Uart0Tx = 2,
    Uart1Rx = 3,
    Uart1Tx = 4,
    Uart1Cts = 5,
    Uart1RxTimeout = 6,
}

/// Number of event slots.
pub const NUM_EVENTS: usize = 7;

impl EventId {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Response code: the named task id was never allocated, or names a task
/// that has exited. Both cases look the same to callers.
pub const NO_SUCH_TASK: i32 = -1;

/// Response code delivered to a blocked sender when its peer exits before
/// replying.
pub const PEER_EXITED: i32 = -2;

/// Response code: `Reply` named a task that is not waiting for a reply from
/// the caller.
pub const NOT_WAITING_FOR_REPLY: i32 = -2;

/// `Create` response code: no free slot in the task descriptor pool.
pub const POOL_EXHAUSTED: i32 = -1;

/// `Create` response code: priority out of range.
pub const INVALID_PRIORITY: i32 = -2;
