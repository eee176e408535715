// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel construction and the dispatch loop.

use abi::{EventId, Priority, TaskId, MAX_TASKS};

use crate::arch::{Port, Sys, TaskEntry, Trap};
use crate::board::{Board, BoardConfig, BoardHandle, Uart};
use crate::event::EventTable;
use crate::sched::Scheduler;
use crate::stats::KernelStats;
use crate::task::{Task, TaskState};

pub struct Kernel {
    pub(crate) tasks: Vec<Task>,
    pub(crate) sched: Scheduler,
    pub(crate) events: EventTable,
    pub(crate) board: Board,
    pub(crate) port: Port,
    pub(crate) stats: KernelStats,
}

/// Final state of a finished run, for inspection by the host.
pub struct KernelReport {
    pub stats: KernelStats,
    /// Everything `KernelPrint` wrote, as text.
    pub console: String,
    /// Virtual time at shutdown, in ticks.
    pub now: u64,
    /// Final state of every slot in the task table.
    pub task_states: Vec<(TaskId, TaskState)>,
}

impl Kernel {
    pub fn new(cfg: BoardConfig) -> (Self, BoardHandle) {
        let (board, handle) = Board::new(cfg);
        let kernel = Self {
            tasks: Vec::with_capacity(MAX_TASKS),
            sched: Scheduler::new(),
            events: EventTable::new(),
            board,
            port: Port::new(),
            stats: KernelStats::default(),
        };
        (kernel, handle)
    }

    /// UART handles for wiring driver tasks at boot.
    pub fn uart0(&self) -> Uart {
        self.board.uart0()
    }

    pub fn uart1(&self) -> Uart {
        self.board.uart1()
    }

    /// Adds a task to the boot set. Boot tasks have no parent and start
    /// runnable, in the order added.
    ///
    /// # Panics
    ///
    /// On an invalid priority or an exhausted pool; the boot set is part
    /// of the system configuration and must fit.
    pub fn add_task(
        &mut self,
        priority: Priority,
        entry: impl FnOnce(Sys) + Send + 'static,
    ) -> TaskId {
        self.allocate_task(None, priority, Box::new(entry))
            .unwrap_or_else(|code| kcrash!("boot task rejected: {}", code))
    }

    /// Allocates a slot, spawns the backing thread, and enqueues the new
    /// task. On failure returns the `Create` response code.
    pub(crate) fn allocate_task(
        &mut self,
        parent: Option<TaskId>,
        priority: Priority,
        entry: TaskEntry,
    ) -> Result<TaskId, i32> {
        if !priority.is_valid() {
            return Err(abi::INVALID_PRIORITY);
        }
        if self.tasks.len() >= MAX_TASKS {
            log::warn!("task pool exhausted");
            return Err(abi::POOL_EXHAUSTED);
        }
        let id = TaskId(self.tasks.len() as u16);
        let save = self.port.spawn(id, entry);
        self.tasks.push(Task::new(id, parent, priority, save));
        self.sched.add_task(priority, id);
        self.stats.tasks_created += 1;
        Ok(id)
    }

    /// Runs the dispatch loop to quiescence: no runnable task and no
    /// event source that could produce one.
    pub fn run(mut self) -> KernelReport {
        loop {
            self.take_interrupts();

            let next = match self.sched.get_next() {
                Some(id) => id,
                None => {
                    if self.can_make_progress_idle()
                        && self.board.advance_time()
                    {
                        self.stats.idle_ticks += 1;
                        continue;
                    }
                    break;
                }
            };

            // Interrupts that latched since the last drain are taken
            // before the chosen task gets the CPU. Its suspension becomes
            // involuntary: it keeps its queue position and its saved
            // activation image is untouched.
            if self.deliverable_irq_pending() {
                let priority = self.tasks[next.index()].priority;
                self.tasks[next.index()].interrupted = true;
                self.sched.add_task_front(priority, next);
                continue;
            }

            self.tasks[next.index()].interrupted = false;
            self.stats.dispatches += 1;
            let trap = self.port.activate(&mut self.tasks[next.index()].save);
            self.handle_trap(trap);
        }

        log::debug!(
            "kernel quiescent at tick {}: {} dispatches, {} idle ticks",
            self.board.now(),
            self.stats.dispatches,
            self.stats.idle_ticks,
        );
        self.report()
    }

    /// With no runnable task, advancing virtual time is only useful if it
    /// can wake someone: a timer waiter, or a receive-timeout waiter with
    /// bytes pending.
    fn can_make_progress_idle(&self) -> bool {
        self.events.has_waiter(EventId::TimerTick)
            || (self.events.has_waiter(EventId::Uart1RxTimeout)
                && self.board.uart1_rx_pending())
    }

    fn take_interrupts(&mut self) {
        self.board.service();
        for event in self.board.pending_events() {
            // A line with no waiter stays pending; it is delivered when
            // its notifier next awaits, like a held hardware line.
            if let Some(waiter) = self.events.take(event) {
                self.board.ack(event);
                self.stats.irqs_delivered += 1;
                // Event payloads: none of the board's sources carry one;
                // the awakened notifier services the peripheral.
                self.resume_with_code(waiter, 0);
            }
        }
    }

    /// True if a pending interrupt line has a registered waiter.
    fn deliverable_irq_pending(&self) -> bool {
        self.board
            .pending_events()
            .iter()
            .any(|&event| self.events.has_waiter(event))
    }

    fn handle_trap(&mut self, trap: Trap) {
        use crate::arch::SysRequest;
        let caller = trap.tid;
        match trap.request {
            SysRequest::Create { priority, entry } => {
                self.count(abi::Sysnum::Create);
                self.sys_create(caller, priority, entry);
            }
            SysRequest::MyTid => {
                self.count(abi::Sysnum::MyTid);
                self.resume_with_code(caller, i32::from(caller.0));
            }
            SysRequest::MyParentTid => {
                self.count(abi::Sysnum::MyParentTid);
                let code = match self.tasks[caller.index()].parent {
                    Some(parent) => i32::from(parent.0),
                    None => abi::NO_SUCH_TASK,
                };
                self.resume_with_code(caller, code);
            }
            SysRequest::Yield => {
                self.count(abi::Sysnum::Yield);
                self.resume_with_code(caller, 0);
            }
            SysRequest::Exit => {
                self.count(abi::Sysnum::Exit);
                self.sys_exit(caller);
            }
            SysRequest::Send {
                target,
                message,
                reply_capacity,
            } => {
                self.count(abi::Sysnum::Send);
                self.sys_send(caller, target, message, reply_capacity);
            }
            SysRequest::Receive { capacity } => {
                self.count(abi::Sysnum::Receive);
                self.sys_receive(caller, capacity);
            }
            SysRequest::Reply { target, message } => {
                self.count(abi::Sysnum::Reply);
                self.sys_reply(caller, target, &message);
            }
            SysRequest::AwaitEvent { event } => {
                self.count(abi::Sysnum::AwaitEvent);
                self.sys_await_event(caller, event);
            }
            SysRequest::KernelPrint { text } => {
                self.count(abi::Sysnum::KernelPrint);
                self.board.console_write(&text);
                self.resume_with_code(caller, 0);
            }
            SysRequest::Crashed { info } => {
                kcrash!("task {} crashed: {}", caller.0, info);
            }
        }
    }

    fn count(&mut self, nr: abi::Sysnum) {
        self.stats.syscalls[nr as usize] += 1;
    }

    fn report(&self) -> KernelReport {
        KernelReport {
            stats: self.stats.clone(),
            console: self.board.console_snapshot(),
            now: self.board.now(),
            task_states: self
                .tasks
                .iter()
                .map(|t| (t.id, t.state))
                .collect(),
        }
    }
}
