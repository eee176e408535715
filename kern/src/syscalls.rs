// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! System call implementations.
//!
//! Each handler runs with no task active. Handlers never fail upward:
//! every outcome is either a response code stored into some task's saved
//! image, a blocking state transition, or a kernel halt for conditions
//! that indicate a bug.
//!
//! # Rendezvous
//!
//! Messaging follows the classical three-phase rendezvous. A sender either
//! finds its peer parked in receive (direct delivery) or parks its message
//! in the peer's inbox; either way it stays blocked until the reply comes
//! back. All copies truncate silently to the smaller buffer, and both
//! sides observe the number of bytes actually transferred.

use abi::{EventId, Priority, TaskId, MSG_CAPACITY};

use crate::arch::TaskEntry;
use crate::startup::Kernel;
use crate::task::{
    check_task_id_against_table, Message, SchedState, TaskState,
};

impl Kernel {
    /// Stores a bare response code and makes the task runnable again.
    pub(crate) fn resume_with_code(&mut self, tid: TaskId, code: i32) {
        self.tasks[tid.index()].save.set_result(code);
        self.make_runnable(tid);
    }

    pub(crate) fn make_runnable(&mut self, tid: TaskId) {
        let task = &mut self.tasks[tid.index()];
        task.set_healthy_state(SchedState::Runnable);
        let priority = task.priority;
        self.sched.add_task(priority, tid);
    }

    /// `Create(priority, entry)`.
    ///
    /// The caller is resumed with the new id before the child is enqueued,
    /// so within one priority level the creator stays ahead of its child.
    /// Across levels the scheduler decides, which is how a freshly created
    /// higher-priority task preempts its creator.
    pub(crate) fn sys_create(
        &mut self,
        caller: TaskId,
        priority: Priority,
        entry: TaskEntry,
    ) {
        if !priority.is_valid() {
            self.resume_with_code(caller, abi::INVALID_PRIORITY);
            return;
        }
        if self.tasks.len() >= abi::MAX_TASKS {
            log::warn!("task pool exhausted");
            self.resume_with_code(caller, abi::POOL_EXHAUSTED);
            return;
        }
        let id = TaskId(self.tasks.len() as u16);
        self.resume_with_code(caller, i32::from(id.0));
        // Cannot fail: both rejection cases were just checked.
        let _ = self.allocate_task(Some(caller), priority, entry);
    }

    /// `Send(target, message, reply_capacity)`.
    pub(crate) fn sys_send(
        &mut self,
        caller: TaskId,
        target: TaskId,
        message: heapless::Vec<u8, MSG_CAPACITY>,
        reply_capacity: usize,
    ) {
        let callee = match check_task_id_against_table(&self.tasks, target) {
            Ok(index) => index,
            Err(e) => {
                self.resume_with_code(caller, e.code());
                return;
            }
        };

        let wait_state = if self.tasks[callee].is_in(SchedState::InRecv) {
            // Receiver is parked: deliver directly and unblock it with the
            // copied length, skipping the inbox.
            let n = message.len().min(self.tasks[callee].recv_capacity);
            self.tasks[callee]
                .save
                .set_recv_result(caller, n as i32, &message[..n]);
            self.make_runnable(target);
            SchedState::InReply(target)
        } else {
            let inbox = &mut self.tasks[callee].inbox;
            if inbox
                .push_back(Message {
                    sender: caller,
                    bytes: message,
                })
                .is_err()
            {
                kcrash!("inbox overflow on task {}", target.0);
            }
            SchedState::InSend(target)
        };

        // Either way the caller now waits for the reply; record where its
        // reply must fit.
        let task = &mut self.tasks[caller.index()];
        task.reply_capacity = reply_capacity;
        task.set_healthy_state(wait_state);
    }

    /// `Receive(capacity)`.
    pub(crate) fn sys_receive(&mut self, caller: TaskId, capacity: usize) {
        match self.tasks[caller.index()].inbox.pop_front() {
            Some(message) => {
                let sender = message.sender;
                if !self.tasks[sender.index()]
                    .is_in(SchedState::InSend(caller))
                {
                    kcrash!(
                        "inbox message from task {} not blocked on receiver {}",
                        sender.0,
                        caller.0
                    );
                }
                self.tasks[sender.index()]
                    .set_healthy_state(SchedState::InReply(caller));
                let n = message.bytes.len().min(capacity);
                self.tasks[caller.index()].save.set_recv_result(
                    sender,
                    n as i32,
                    &message.bytes[..n],
                );
                self.make_runnable(caller);
            }
            None => {
                // Invariant: a task in receive-wait has an empty inbox.
                let task = &mut self.tasks[caller.index()];
                task.recv_capacity = capacity;
                task.set_healthy_state(SchedState::InRecv);
            }
        }
    }

    /// `Reply(target, message)`.
    ///
    /// A single send is satisfied by exactly one reply: the peer must be
    /// waiting for a reply from the caller specifically.
    pub(crate) fn sys_reply(
        &mut self,
        caller: TaskId,
        target: TaskId,
        message: &[u8],
    ) {
        let callee = match check_task_id_against_table(&self.tasks, target) {
            Ok(index) => index,
            Err(e) => {
                self.resume_with_code(caller, e.code());
                return;
            }
        };
        if !self.tasks[callee].is_in(SchedState::InReply(caller)) {
            self.resume_with_code(caller, abi::NOT_WAITING_FOR_REPLY);
            return;
        }
        let n = message.len().min(self.tasks[callee].reply_capacity);
        self.tasks[callee].save.set_send_result(n as i32, &message[..n]);
        // Sender first, then the replier, so at equal priority the
        // unblocked sender runs before the server's next receive.
        self.make_runnable(target);
        self.resume_with_code(caller, 0);
    }

    /// `Exit()`. Retires the slot and resumes any task blocked on the
    /// dying one with the peer-exited code.
    pub(crate) fn sys_exit(&mut self, caller: TaskId) {
        let task = &mut self.tasks[caller.index()];
        task.state = TaskState::Zombie;
        while task.inbox.pop_front().is_some() {}

        for index in 0..self.tasks.len() {
            let peer = self.tasks[index].id;
            let blocked_on_caller = matches!(
                self.tasks[index].state,
                TaskState::Healthy(SchedState::InSend(t))
                    | TaskState::Healthy(SchedState::InReply(t))
                if t == caller
            );
            if blocked_on_caller {
                self.resume_with_code(peer, abi::PEER_EXITED);
            }
        }
    }

    /// `AwaitEvent(event)`.
    pub(crate) fn sys_await_event(&mut self, caller: TaskId, event: EventId) {
        self.events.wait(event, caller);
        self.tasks[caller.index()]
            .set_healthy_state(SchedState::InAwait(event));
    }
}
