// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-side interface to the kernel.
//!
//! The raw `sys_*` functions mirror the syscall surface one to one and
//! speak response codes; the typed wrappers below them turn codes into
//! errors. Servers usually want the [`hl`] helpers instead of calling
//! `sys_receive` directly.
//!
//! A task exits by returning from its entry function; there is no
//! `sys_exit` wrapper because unwinding out of arbitrary call depth
//! belongs to the task, not to a library call.

pub use abi::*;
pub use kern::Sys;
pub use num_derive::{FromPrimitive, ToPrimitive};
pub use num_traits::{FromPrimitive, ToPrimitive};

// Re-exported for the `kprintln!` macro.
pub use heapless;

use kern::arch::SysRequest;

pub mod courier;
pub mod hl;

fn outgoing(bytes: &[u8]) -> heapless::Vec<u8, MSG_CAPACITY> {
    heapless::Vec::from_slice(bytes).unwrap_or_else(|_| {
        panic!("outgoing message of {} bytes exceeds capacity", bytes.len())
    })
}

/// `Send`: delivers `out` to `target` and parks until the reply lands in
/// `incoming`. Returns the reply length, or a negative response code.
pub fn sys_send(
    sys: &Sys,
    target: TaskId,
    out: &[u8],
    incoming: &mut [u8],
) -> i32 {
    let resume = sys.syscall(SysRequest::Send {
        target,
        message: outgoing(out),
        reply_capacity: incoming.len(),
    });
    if resume.code > 0 {
        let n = resume.data.len();
        incoming[..n].copy_from_slice(&resume.data);
    }
    resume.code
}

/// `Receive`: parks until a message arrives, then returns the sender and
/// the copied length.
pub fn sys_receive(sys: &Sys, buffer: &mut [u8]) -> (TaskId, usize) {
    let resume = sys.syscall(SysRequest::Receive {
        capacity: buffer.len(),
    });
    let n = resume.data.len();
    buffer[..n].copy_from_slice(&resume.data);
    (resume.sender, n)
}

/// `Reply`: resumes a sender parked on the caller. Returns `0` or a
/// negative response code.
pub fn sys_reply(sys: &Sys, target: TaskId, message: &[u8]) -> i32 {
    sys.syscall(SysRequest::Reply {
        target,
        message: outgoing(message),
    })
    .code
}

/// `Create`: returns the new task id or a negative response code.
pub fn sys_create(
    sys: &Sys,
    priority: Priority,
    entry: impl FnOnce(Sys) + Send + 'static,
) -> i32 {
    sys.syscall(SysRequest::Create {
        priority,
        entry: Box::new(entry),
    })
    .code
}

pub fn sys_my_tid(sys: &Sys) -> TaskId {
    TaskId(sys.syscall(SysRequest::MyTid).code as u16)
}

/// Returns the creator's id, or `None` for a boot task.
pub fn sys_my_parent_tid(sys: &Sys) -> Option<TaskId> {
    match sys.syscall(SysRequest::MyParentTid).code {
        code if code >= 0 => Some(TaskId(code as u16)),
        _ => None,
    }
}

/// `Yield`: requeues the caller at the tail of its priority level.
pub fn sys_yield(sys: &Sys) {
    sys.syscall(SysRequest::Yield);
}

/// `AwaitEvent`: parks until the event fires; returns its payload.
pub fn sys_await_event(sys: &Sys, event: EventId) -> i32 {
    sys.syscall(SysRequest::AwaitEvent { event }).code
}

/// `KernelPrint`: appends bytes to the board console.
pub fn sys_print(sys: &Sys, text: &[u8]) {
    sys.syscall(SysRequest::KernelPrint {
        text: outgoing(text),
    });
}

/// Formats a line onto the kernel console.
#[macro_export]
macro_rules! kprintln {
    ($sys:expr, $($arg:tt)*) => {{
        let mut line = $crate::heapless::String::<{ $crate::MSG_CAPACITY }>::new();
        let _ = core::fmt::Write::write_fmt(&mut line, format_args!($($arg)*));
        let _ = line.push('\n');
        $crate::sys_print($sys, line.as_bytes());
    }};
}

/// Failures of `Send`, decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SendError {
    #[error("no such task")]
    NoSuchTask,
    #[error("peer exited before replying")]
    PeerExited,
}

/// Failures of `Reply`, decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ReplyError {
    #[error("no such task")]
    NoSuchTask,
    #[error("peer is not waiting for a reply")]
    NotWaitingForReply,
}

/// Failures of `Create`, decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CreateError {
    #[error("task pool exhausted")]
    PoolExhausted,
    #[error("priority out of range")]
    InvalidPriority,
}

/// Typed `Send`; returns the reply length.
pub fn send(
    sys: &Sys,
    target: TaskId,
    out: &[u8],
    incoming: &mut [u8],
) -> Result<usize, SendError> {
    match sys_send(sys, target, out, incoming) {
        n if n >= 0 => Ok(n as usize),
        NO_SUCH_TASK => Err(SendError::NoSuchTask),
        PEER_EXITED => Err(SendError::PeerExited),
        other => panic!("send: unknown response code {}", other),
    }
}

/// Typed `Reply`.
pub fn reply(
    sys: &Sys,
    target: TaskId,
    message: &[u8],
) -> Result<(), ReplyError> {
    match sys_reply(sys, target, message) {
        0 => Ok(()),
        NO_SUCH_TASK => Err(ReplyError::NoSuchTask),
        NOT_WAITING_FOR_REPLY => Err(ReplyError::NotWaitingForReply),
        other => panic!("reply: unknown response code {}", other),
    }
}

/// Typed `Create`.
pub fn create(
    sys: &Sys,
    priority: Priority,
    entry: impl FnOnce(Sys) + Send + 'static,
) -> Result<TaskId, CreateError> {
    match sys_create(sys, priority, entry) {
        id if id >= 0 => Ok(TaskId(id as u16)),
        POOL_EXHAUSTED => Err(CreateError::PoolExhausted),
        INVALID_PRIORITY => Err(CreateError::InvalidPriority),
        other => panic!("create: unknown response code {}", other),
    }
}
