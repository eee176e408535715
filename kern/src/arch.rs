// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Context-switch backend.
//!
//! Contract: on kernel entry the current task's state is saved; on return
//! from the kernel, the scheduler-selected task resumes at the point it was
//! last suspended. Everything target-specific about how that happens is
//! confined to this module.
//!
//! This backend runs each task body on a dedicated host thread and
//! serializes them onto one virtual CPU. "Kernel entry" is a record of the
//! system-call arguments sent over a channel; "return to user" sends the
//! saved return-value image back. At most one task thread is unparked at
//! any time: the kernel sends exactly one activation and then blocks until
//! that task traps, so kernel structures are never touched concurrently.
//!
//! A task that is marked interrupted simply has its activation deferred;
//! its saved image is untouched and delivery happens at the next
//! activation, which is indistinguishable from resuming the interrupted
//! instruction.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use abi::{EventId, Priority, TaskId, MSG_CAPACITY};

/// A task body. Entered once at the task's first activation; returning
/// from it is how a task exits.
pub type TaskEntry = Box<dyn FnOnce(Sys) + Send + 'static>;

/// Kernel-entry record: the cause of a trap out of user code, with its
/// arguments. The analogue of reading the syscall argument registers.
pub enum SysRequest {
    Create {
        priority: Priority,
        entry: TaskEntry,
    },
    MyTid,
    MyParentTid,
    Yield,
    Exit,
    Send {
        target: TaskId,
        message: heapless::Vec<u8, MSG_CAPACITY>,
        reply_capacity: usize,
    },
    Receive {
        capacity: usize,
    },
    Reply {
        target: TaskId,
        message: heapless::Vec<u8, MSG_CAPACITY>,
    },
    AwaitEvent {
        event: EventId,
    },
    KernelPrint {
        text: heapless::Vec<u8, MSG_CAPACITY>,
    },
    /// Injected by the task wrapper when a task body panics. Not a system
    /// call; always fatal.
    Crashed {
        info: String,
    },
}

/// Return-value image delivered to a task when it is next activated. The
/// analogue of the syscall return registers plus the kernel-filled buffer.
#[derive(Clone, Default)]
pub struct Resume {
    pub code: i32,
    pub sender: TaskId,
    pub data: heapless::Vec<u8, MSG_CAPACITY>,
}

/// A trap out of user code: which task, and why.
pub struct Trap {
    pub tid: TaskId,
    pub request: SysRequest,
}

/// Per-task saved state: the pending return-value image and the channel
/// that resumes the task's thread.
pub struct SavedState {
    resume: Resume,
    channel: mpsc::SyncSender<Resume>,
}

impl SavedState {
    /// Sets a bare response code.
    pub fn set_result(&mut self, code: i32) {
        self.resume = Resume {
            code,
            ..Default::default()
        };
    }

    /// Sets the result of a completed `Send`: the reply bytes (already
    /// truncated by the caller) and their length as the code.
    pub fn set_send_result(&mut self, code: i32, reply: &[u8]) {
        self.resume = Resume {
            code,
            sender: TaskId::default(),
            data: heapless::Vec::from_slice(reply)
                .unwrap_or_else(|_| kcrash!("reply exceeds message capacity")),
        };
    }

    /// Sets the result of a completed `Receive`: sender id, message bytes
    /// (already truncated), and the code.
    pub fn set_recv_result(&mut self, sender: TaskId, code: i32, bytes: &[u8]) {
        self.resume = Resume {
            code,
            sender,
            data: heapless::Vec::from_slice(bytes)
                .unwrap_or_else(|_| kcrash!("message exceeds message capacity")),
        };
    }
}

/// The kernel's side of the handoff: spawns task threads and performs
/// activations.
pub struct Port {
    trap_tx: mpsc::Sender<Trap>,
    trap_rx: mpsc::Receiver<Trap>,
}

impl Port {
    pub fn new() -> Self {
        let (trap_tx, trap_rx) = mpsc::channel();
        Self { trap_tx, trap_rx }
    }

    /// Spawns the thread backing a new task and returns its saved state.
    /// The thread parks immediately; the task body does not run until the
    /// first activation.
    pub fn spawn(&self, tid: TaskId, entry: TaskEntry) -> SavedState {
        let (act_tx, act_rx) = mpsc::sync_channel(1);
        let trap_tx = self.trap_tx.clone();
        thread::Builder::new()
            .name(format!("task-{}", tid.0))
            .spawn(move || {
                // First activation starts the body; its image is unused.
                if act_rx.recv().is_err() {
                    // Kernel went away before this task ever ran.
                    return;
                }
                let sys = Sys {
                    tid,
                    trap_tx: trap_tx.clone(),
                    resume_rx: act_rx,
                };
                let outcome = catch_unwind(AssertUnwindSafe(move || entry(sys)));
                let request = match outcome {
                    Ok(()) => SysRequest::Exit,
                    Err(payload) => SysRequest::Crashed {
                        info: panic_message(&payload),
                    },
                };
                // If this fails the kernel is already gone; nothing to do.
                let _ = trap_tx.send(Trap { tid, request });
            })
            .unwrap_or_else(|e| kcrash!("spawning task thread: {}", e));
        SavedState {
            resume: Resume::default(),
            channel: act_tx,
        }
    }

    /// Resumes the given task and blocks until the next kernel entry.
    /// Because exactly one task thread is runnable, the trap received is
    /// always from the task just activated.
    pub fn activate(&self, save: &mut SavedState) -> Trap {
        let image = std::mem::take(&mut save.resume);
        if save.channel.send(image).is_err() {
            kcrash!("activated a task whose thread has exited");
        }
        self.trap_rx
            .recv()
            .unwrap_or_else(|_| kcrash!("trap channel closed"))
    }
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

/// A task's capability to enter the kernel. One per task, owned by the
/// task body; the ergonomic wrappers over it live in `userlib`.
pub struct Sys {
    tid: TaskId,
    trap_tx: mpsc::Sender<Trap>,
    resume_rx: mpsc::Receiver<Resume>,
}

impl Sys {
    /// Traps into the kernel and parks until the kernel delivers the
    /// result at this task's next activation.
    pub fn syscall(&self, request: SysRequest) -> Resume {
        let trap = Trap {
            tid: self.tid,
            request,
        };
        if self.trap_tx.send(trap).is_err() {
            halt();
        }
        match self.resume_rx.recv() {
            Ok(resume) => resume,
            Err(_) => halt(),
        }
    }
}

/// Parks the calling task thread forever. Reached only when the kernel has
/// shut down while this task was parked; the machine is off and the thread
/// will never be resumed.
fn halt() -> ! {
    loop {
        thread::park();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
