// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Train command admin.
//!
//! Serializes speed, reverse and switch requests into the controller byte
//! protocol on UART channel 1. Requesters are unblocked as soon as the
//! command is accepted; the actual bytes trickle out under CTS flow
//! control. Callers that must not block here (the track server) go through
//! couriers.

use userlib::hl;
use userlib::Sys;

pub mod api {
    //! Wire format and client stubs.

    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, U32};

    pub const TRAIN_ADMIN_NAME: &str = "train.admin";

    /// Highest speed step the controller understands.
    pub const MAX_SPEED: u8 = 14;

    /// Controller byte for "reverse" (speed 15).
    pub const REVERSE_BYTE: u8 = 0x0f;
    /// Controller byte prefix for "throw switch curved".
    pub const SWITCH_CURVED_BYTE: u8 = 0x20;
    /// Controller byte prefix for "throw switch straight".
    pub const SWITCH_STRAIGHT_BYTE: u8 = 0x21;

    /// Switch direction, as the rest of the system names it.
    pub const DIR_STRAIGHT: u8 = b's';
    pub const DIR_CURVED: u8 = b'c';

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        SetSpeed = 1,
        Reverse = 2,
        Switch = 3,
    }

    /// One request, whatever the operation: `a` and `b` are op-specific.
    /// SetSpeed: train, speed. Reverse: train, -. Switch: switch id,
    /// direction (`b's'` / `b'c'`).
    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct TrainRequest {
        pub op: U32<LittleEndian>,
        pub a: u8,
        pub b: u8,
    }

    impl TrainRequest {
        pub fn new(op: Op, a: u8, b: u8) -> Self {
            Self {
                op: U32::new(op as u32),
                a,
                b,
            }
        }
    }

    pub fn set_speed(sys: &Sys, admin: TaskId, train: u8, speed: u8) {
        assert!(speed <= MAX_SPEED);
        let request = TrainRequest::new(Op::SetSpeed, train, speed);
        let _: Option<[u8; 0]> = hl::send_fixed(sys, admin, &request);
    }

    /// Issues the reverse command. The operator must have brought the
    /// train to a stop first; the admin does not model motion.
    pub fn reverse(sys: &Sys, admin: TaskId, train: u8) {
        let request = TrainRequest::new(Op::Reverse, train, 0);
        let _: Option<[u8; 0]> = hl::send_fixed(sys, admin, &request);
    }

    pub fn throw_switch(sys: &Sys, admin: TaskId, switch: u8, dir: u8) {
        assert!(dir == DIR_STRAIGHT || dir == DIR_CURVED);
        let request = TrainRequest::new(Op::Switch, switch, dir);
        let _: Option<[u8; 0]> = hl::send_fixed(sys, admin, &request);
    }
}

/// Server entry point.
pub fn train_admin(sys: Sys) {
    task_names::api::register_as(&sys, api::TRAIN_ADMIN_NAME)
        .unwrap_or_else(|e| panic!("train admin: {}", e));
    let uart1_tx = task_names::resolve(&sys, task_uart::api::tx_name(1));

    let mut buffer = [0; core::mem::size_of::<api::TrainRequest>()];
    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            let (request, caller) =
                message.fixed::<api::TrainRequest, [u8; 0]>().ok_or(-1)?;
            let (a, b) = (request.a, request.b);
            // Unblock the requester before the (possibly CTS-paced) write.
            caller.reply(&sys, []);
            match op {
                api::Op::SetSpeed => {
                    if b > api::MAX_SPEED {
                        log::warn!("speed {} out of range for train {}", b, a);
                        return Ok(());
                    }
                    task_uart::api::puts(&sys, uart1_tx, &[b, a]);
                }
                api::Op::Reverse => {
                    task_uart::api::puts(&sys, uart1_tx, &[api::REVERSE_BYTE, a]);
                }
                api::Op::Switch => {
                    let prefix = match b {
                        api::DIR_STRAIGHT => api::SWITCH_STRAIGHT_BYTE,
                        api::DIR_CURVED => api::SWITCH_CURVED_BYTE,
                        _ => {
                            log::warn!("bad switch direction {:#x}", b);
                            return Ok(());
                        }
                    };
                    task_uart::api::puts(&sys, uart1_tx, &[prefix, a]);
                }
            }
            Ok(())
        });
    }
}
