// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clock server: tick counting and parked delays.
//!
//! One tick is 10 ms of board time. A dedicated notifier forwards every
//! timer event as a message; delayed tasks are parked unreplied in a
//! deadline-ordered heap and woken as their deadlines pass. Timeouts
//! anywhere else in the system are built from this server, never from the
//! kernel.

use abi::{priority, EventId};
use heapless::binary_heap::Min;
use userlib::hl;
use userlib::{create, sys_await_event, sys_my_parent_tid, Sys, TaskId};
use zerocopy::AsBytes;

pub mod api {
    //! Wire format and client stubs.

    use task_names::api::who_is;
    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, I32, U32};

    pub const CLOCK_SERVER_NAME: &str = "clock";

    /// Reply when a delay argument is negative.
    pub const INVALID_DELAY: i32 = -2;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        Time = 1,
        Delay = 2,
        DelayUntil = 3,
        /// Notifier-only: one timer tick elapsed.
        Tick = 4,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct ClockRequest {
        pub op: U32<LittleEndian>,
        pub ticks: I32<LittleEndian>,
    }

    impl ClockRequest {
        pub fn new(op: Op, ticks: i32) -> Self {
            Self {
                op: U32::new(op as u32),
                ticks: I32::new(ticks),
            }
        }
    }

    pub type ClockReply = I32<LittleEndian>;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
    pub enum ClockError {
        #[error("negative delay")]
        InvalidDelay,
        #[error("clock server unreachable")]
        Unreachable,
    }

    pub fn clock_tid(sys: &Sys) -> Option<TaskId> {
        who_is(sys, CLOCK_SERVER_NAME).ok()
    }

    fn transact(
        sys: &Sys,
        clock: TaskId,
        op: Op,
        ticks: i32,
    ) -> Result<u32, ClockError> {
        let request = ClockRequest::new(op, ticks);
        let reply: ClockReply = hl::send_fixed(sys, clock, &request)
            .ok_or(ClockError::Unreachable)?;
        match reply.get() {
            t if t >= 0 => Ok(t as u32),
            INVALID_DELAY => Err(ClockError::InvalidDelay),
            _ => Err(ClockError::Unreachable),
        }
    }

    /// Current time in ticks.
    pub fn time(sys: &Sys, clock: TaskId) -> Result<u32, ClockError> {
        transact(sys, clock, Op::Time, 0)
    }

    /// Parks the caller for `ticks`; replies with the time of waking.
    pub fn delay(
        sys: &Sys,
        clock: TaskId,
        ticks: i32,
    ) -> Result<u32, ClockError> {
        transact(sys, clock, Op::Delay, ticks)
    }

    /// Parks the caller until the given absolute tick.
    pub fn delay_until(
        sys: &Sys,
        clock: TaskId,
        tick: i32,
    ) -> Result<u32, ClockError> {
        transact(sys, clock, Op::DelayUntil, tick)
    }
}

/// Tasks that can be parked in delays at once.
const MAX_DELAYED: usize = 32;

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Delayed {
    deadline: u32,
    caller: TaskId,
}

fn tick_notifier(sys: Sys) {
    let server = sys_my_parent_tid(&sys).unwrap();
    let tick = api::ClockRequest::new(api::Op::Tick, 0);
    loop {
        sys_await_event(&sys, EventId::TimerTick);
        userlib::sys_send(&sys, server, tick.as_bytes(), &mut []);
    }
}

/// Server entry point. Creates its own notifier.
pub fn clock_server(sys: Sys) {
    task_names::api::register_as(&sys, api::CLOCK_SERVER_NAME)
        .unwrap_or_else(|e| panic!("clock server: {}", e));
    let notifier = create(&sys, priority::NOTIFIER, tick_notifier)
        .unwrap_or_else(|e| panic!("creating tick notifier: {}", e));

    let mut now: u32 = 0;
    let mut delayed: heapless::BinaryHeap<Delayed, Min, MAX_DELAYED> =
        heapless::BinaryHeap::new();
    let mut buffer = [0; core::mem::size_of::<api::ClockRequest>()];

    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            let (request, caller) =
                message.fixed::<api::ClockRequest, api::ClockReply>().ok_or(-1)?;
            let ticks = request.ticks.get();
            match op {
                api::Op::Time => {
                    caller.reply(&sys, api::ClockReply::new(now as i32));
                }
                api::Op::Delay if ticks < 0 => {
                    caller.reply_fail(&sys, api::INVALID_DELAY);
                }
                api::Op::Delay => {
                    park(&mut delayed, now.wrapping_add(ticks as u32), caller, &sys, now);
                }
                api::Op::DelayUntil if ticks < 0 => {
                    caller.reply_fail(&sys, api::INVALID_DELAY);
                }
                api::Op::DelayUntil => {
                    park(&mut delayed, ticks as u32, caller, &sys, now);
                }
                api::Op::Tick => {
                    assert_eq!(caller.task_id(), notifier);
                    now += 1;
                    caller.reply(&sys, api::ClockReply::new(now as i32));
                    while let Some(head) = delayed.peek() {
                        if head.deadline > now {
                            break;
                        }
                        let woken = delayed.pop().unwrap();
                        hl::reply_code(&sys, woken.caller, now as i32);
                    }
                }
            }
            Ok(())
        });
    }
}

fn park(
    delayed: &mut heapless::BinaryHeap<Delayed, Min, MAX_DELAYED>,
    deadline: u32,
    caller: hl::Caller<api::ClockReply>,
    sys: &Sys,
    now: u32,
) {
    if deadline <= now {
        caller.reply(sys, api::ClockReply::new(now as i32));
        return;
    }
    let entry = Delayed {
        deadline,
        caller: caller.task_id(),
    };
    if delayed.push(entry).is_err() {
        panic!("delay table full");
    }
}
