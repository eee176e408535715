// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensor admin.
//!
//! Polls the track's sensor modules over UART channel 1: every poll
//! period a query byte goes out and ten state bytes come back, one bit
//! per sensor. The admin serves snapshots on demand and parks subscribers
//! until the state changes. The blocking I/O lives in a worker task so the
//! admin's request loop never waits on the wire.

use abi::priority;
use userlib::hl;
use userlib::{create, sys_my_parent_tid, Sys, TaskId};
use zerocopy::AsBytes;

pub mod api {
    //! Wire format and client stubs.

    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, U32};

    pub const SENSOR_ADMIN_NAME: &str = "sensor.admin";

    /// Sensor modules report as this many bytes, one bit per sensor.
    pub const NUM_SENSOR_BYTES: usize = 10;

    /// Controller byte requesting a dump of all five sensor modules.
    pub const SENSOR_DUMP_QUERY: u8 = 0x85;

    /// Poll period, in clock ticks.
    pub const POLL_TICKS: i32 = 10;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        GetState = 1,
        Subscribe = 2,
        /// Worker-only: a fresh dump came back from the wire.
        Update = 3,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct SensorRequest {
        pub op: U32<LittleEndian>,
        pub state: [u8; NUM_SENSOR_BYTES],
    }

    impl SensorRequest {
        pub fn new(op: Op, state: [u8; NUM_SENSOR_BYTES]) -> Self {
            Self {
                op: U32::new(op as u32),
                state,
            }
        }
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct SensorStateReply {
        pub state: [u8; NUM_SENSOR_BYTES],
    }

    pub fn sensor_tid(sys: &Sys) -> Option<TaskId> {
        task_names::api::who_is(sys, SENSOR_ADMIN_NAME).ok()
    }

    /// Latest sensor snapshot.
    pub fn sensor_state(
        sys: &Sys,
        admin: TaskId,
    ) -> [u8; NUM_SENSOR_BYTES] {
        let request = SensorRequest::new(Op::GetState, [0; NUM_SENSOR_BYTES]);
        let reply: SensorStateReply =
            hl::send_fixed(sys, admin, &request).expect("sensor admin gone");
        reply.state
    }

    /// Parks until the sensor state next changes.
    pub fn await_change(
        sys: &Sys,
        admin: TaskId,
    ) -> [u8; NUM_SENSOR_BYTES] {
        let request = SensorRequest::new(Op::Subscribe, [0; NUM_SENSOR_BYTES]);
        let reply: SensorStateReply =
            hl::send_fixed(sys, admin, &request).expect("sensor admin gone");
        reply.state
    }
}

const MAX_SUBSCRIBERS: usize = 32;

/// Drives the wire: delay, query, read the dump, report to the admin.
fn sensor_query_worker(sys: Sys) {
    let admin = sys_my_parent_tid(&sys).unwrap();
    let clock = task_names::resolve(&sys, task_clock::api::CLOCK_SERVER_NAME);
    let uart1_tx = task_names::resolve(&sys, task_uart::api::tx_name(1));
    let uart1_rx = task_names::resolve(&sys, task_uart::api::rx_name(1));

    loop {
        if task_clock::api::delay(&sys, clock, api::POLL_TICKS).is_err() {
            panic!("sensor worker lost the clock");
        }
        task_uart::api::putc(&sys, uart1_tx, api::SENSOR_DUMP_QUERY);
        let mut state = [0; api::NUM_SENSOR_BYTES];
        for byte in state.iter_mut() {
            *byte = task_uart::api::getc(&sys, uart1_rx);
        }
        let update = api::SensorRequest::new(api::Op::Update, state);
        userlib::sys_send(&sys, admin, update.as_bytes(), &mut []);
    }
}

/// Server entry point. Creates its own query worker.
pub fn sensor_admin(sys: Sys) {
    task_names::api::register_as(&sys, api::SENSOR_ADMIN_NAME)
        .unwrap_or_else(|e| panic!("sensor admin: {}", e));
    create(&sys, priority::COURIER, sensor_query_worker)
        .unwrap_or_else(|e| panic!("creating sensor worker: {}", e));

    let mut state = [0; api::NUM_SENSOR_BYTES];
    let mut subscribers: heapless::Deque<TaskId, MAX_SUBSCRIBERS> =
        heapless::Deque::new();
    let mut buffer = [0; core::mem::size_of::<api::SensorRequest>()];

    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            match op {
                api::Op::GetState => {
                    let (_, caller) = message
                        .fixed::<api::SensorRequest, api::SensorStateReply>()
                        .ok_or(-1)?;
                    caller.reply(&sys, api::SensorStateReply { state });
                }
                api::Op::Subscribe => {
                    if subscribers.push_back(message.sender()).is_err() {
                        panic!("sensor subscriber table full");
                    }
                }
                api::Op::Update => {
                    let (request, caller) = message
                        .fixed::<api::SensorRequest, [u8; 0]>()
                        .ok_or(-1)?;
                    let fresh = request.state;
                    caller.reply(&sys, []);
                    if fresh != state {
                        state = fresh;
                        while let Some(subscriber) = subscribers.pop_front() {
                            let _ = userlib::sys_reply(
                                &sys,
                                subscriber,
                                api::SensorStateReply { state }.as_bytes(),
                            );
                        }
                    }
                }
            }
            Ok(())
        });
    }
}
