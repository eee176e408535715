// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UART servers.
//!
//! Each channel gets one transmit server and one receive server, each with
//! dedicated notifier tasks for its interrupt lines. Channel 0 is the
//! operator terminal; channel 1 is the train controller, which adds CTS
//! flow control (one command byte per CTS cycle) and a receive-timeout
//! line for draining short sensor bursts.
//!
//! The servers are the only tasks that touch the UART hardware. Everything
//! else goes through `Getc`/`Putc`/`Puts`.

use abi::{priority, EventId};
use kern::board::Uart;
use userlib::hl;
use userlib::{create, sys_await_event, sys_my_parent_tid, Sys, TaskId};
use zerocopy::AsBytes;

pub mod api {
    //! Wire format and client stubs.

    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, U32};

    /// Longest text slice carried by one `Puts` request; longer writes are
    /// chunked by the client stub.
    pub const PUTS_CHUNK: usize = 256;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        Putc = 1,
        Puts = 2,
        Getc = 3,
        /// Notifier-only: transmit FIFO has room again.
        NotifyTx = 4,
        /// Notifier-only: receive FIFO has data.
        NotifyRx = 5,
        /// Notifier-only: CTS reasserted.
        NotifyCts = 6,
        /// Notifier-only: receive timeout with data pending.
        NotifyRxTimeout = 7,
    }

    pub fn tx_name(channel: usize) -> &'static str {
        match channel {
            0 => "uart0.tx",
            1 => "uart1.tx",
            _ => panic!("no such uart channel: {}", channel),
        }
    }

    pub fn rx_name(channel: usize) -> &'static str {
        match channel {
            0 => "uart0.rx",
            1 => "uart1.rx",
            _ => panic!("no such uart channel: {}", channel),
        }
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PutcRequest {
        pub op: U32<LittleEndian>,
        pub byte: u8,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PutsRequest {
        pub op: U32<LittleEndian>,
        pub len: U32<LittleEndian>,
        pub text: [u8; PUTS_CHUNK],
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PlainRequest {
        pub op: U32<LittleEndian>,
    }

    impl PlainRequest {
        pub fn new(op: Op) -> Self {
            Self {
                op: U32::new(op as u32),
            }
        }
    }

    /// Queues one byte for transmission. Returns once the byte is queued,
    /// not once it is on the wire.
    pub fn putc(sys: &Sys, server: TaskId, byte: u8) {
        let request = PutcRequest {
            op: U32::new(Op::Putc as u32),
            byte,
        };
        let _: Option<[u8; 0]> = hl::send_fixed(sys, server, &request);
    }

    /// Queues a string of bytes for transmission, chunking as needed.
    pub fn puts(sys: &Sys, server: TaskId, text: &[u8]) {
        for chunk in text.chunks(PUTS_CHUNK) {
            let mut request = PutsRequest {
                op: U32::new(Op::Puts as u32),
                len: U32::new(chunk.len() as u32),
                text: [0; PUTS_CHUNK],
            };
            request.text[..chunk.len()].copy_from_slice(chunk);
            let _: Option<[u8; 0]> = hl::send_fixed(sys, server, &request);
        }
    }

    /// Blocks until one byte arrives on the channel.
    pub fn getc(sys: &Sys, server: TaskId) -> u8 {
        let request = PlainRequest::new(Op::Getc);
        let reply: [u8; 1] = hl::send_fixed(sys, server, &request)
            .unwrap_or_else(|| panic!("getc: server gone"));
        reply[0]
    }
}

/// Outbound character queue depth, per channel.
const CHAR_QUEUE: usize = 1024;
/// Parked `Getc` callers, per channel.
const GETTER_QUEUE: usize = 64;

fn event_notifier(sys: Sys, event: EventId, op: api::Op) {
    let server = sys_my_parent_tid(&sys).unwrap();
    let request = api::PlainRequest::new(op);
    loop {
        sys_await_event(&sys, event);
        userlib::sys_send(&sys, server, request.as_bytes(), &mut []);
    }
}

/// Transmit server for one channel. Owns the TX side of the device;
/// `Putc`/`Puts` enqueue and return immediately, the queue drains as fast
/// as the FIFO (and CTS, on the flow-controlled channel) allows.
pub fn transmit_server(sys: Sys, channel: usize, uart: Uart) {
    task_names::api::register_as(&sys, api::tx_name(channel))
        .unwrap_or_else(|e| panic!("uart{} tx: {}", channel, e));

    let (tx_event, cts_event) = match channel {
        0 => (EventId::Uart0Tx, None),
        1 => (EventId::Uart1Tx, Some(EventId::Uart1Cts)),
        _ => panic!("no such uart channel: {}", channel),
    };
    create(&sys, priority::NOTIFIER, move |sys| {
        event_notifier(sys, tx_event, api::Op::NotifyTx)
    })
    .unwrap();
    if let Some(cts_event) = cts_event {
        create(&sys, priority::NOTIFIER, move |sys| {
            event_notifier(sys, cts_event, api::Op::NotifyCts)
        })
        .unwrap();
    }

    let mut out: heapless::Deque<u8, CHAR_QUEUE> = heapless::Deque::new();
    let mut buffer = [0; core::mem::size_of::<api::PutsRequest>()];

    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            match op {
                api::Op::Putc => {
                    let (request, caller) =
                        message.fixed::<api::PutcRequest, [u8; 0]>().ok_or(-1)?;
                    enqueue(&mut out, &[request.byte]);
                    caller.reply(&sys, []);
                }
                api::Op::Puts => {
                    let (request, caller) =
                        message.fixed::<api::PutsRequest, [u8; 0]>().ok_or(-1)?;
                    let len = request.len.get() as usize;
                    if len > api::PUTS_CHUNK {
                        caller.reply_fail(&sys, -1);
                        return Ok(());
                    }
                    enqueue(&mut out, &request.text[..len]);
                    caller.reply(&sys, []);
                }
                api::Op::NotifyTx | api::Op::NotifyCts => {
                    hl::reply_empty(&sys, message.sender());
                }
                _ => {
                    hl::reply_code(&sys, message.sender(), hl::BAD_OP);
                }
            }
            // Push whatever the device will take right now; the rest waits
            // for the next TX or CTS event.
            while let Some(&byte) = out.front() {
                if uart.try_put(byte) {
                    out.pop_front();
                } else {
                    break;
                }
            }
            Ok(())
        });
    }
}

fn enqueue(out: &mut heapless::Deque<u8, CHAR_QUEUE>, bytes: &[u8]) {
    for &b in bytes {
        if out.push_back(b).is_err() {
            panic!("transmit queue overflow");
        }
    }
}

/// Receive server for one channel. Drains the RX FIFO on notifier wakeups
/// and parks `Getc` callers until bytes are available.
pub fn receive_server(sys: Sys, channel: usize, uart: Uart) {
    task_names::api::register_as(&sys, api::rx_name(channel))
        .unwrap_or_else(|e| panic!("uart{} rx: {}", channel, e));

    let (rx_event, timeout_event) = match channel {
        0 => (EventId::Uart0Rx, None),
        1 => (EventId::Uart1Rx, Some(EventId::Uart1RxTimeout)),
        _ => panic!("no such uart channel: {}", channel),
    };
    create(&sys, priority::NOTIFIER, move |sys| {
        event_notifier(sys, rx_event, api::Op::NotifyRx)
    })
    .unwrap();
    if let Some(timeout_event) = timeout_event {
        create(&sys, priority::NOTIFIER, move |sys| {
            event_notifier(sys, timeout_event, api::Op::NotifyRxTimeout)
        })
        .unwrap();
    }

    let mut chars: heapless::Deque<u8, CHAR_QUEUE> = heapless::Deque::new();
    let mut getters: heapless::Deque<TaskId, GETTER_QUEUE> =
        heapless::Deque::new();
    let mut buffer = [0; core::mem::size_of::<api::PlainRequest>()];

    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            match op {
                api::Op::Getc => {
                    if getters.push_back(message.sender()).is_err() {
                        panic!("getter queue overflow");
                    }
                }
                api::Op::NotifyRx | api::Op::NotifyRxTimeout => {
                    hl::reply_empty(&sys, message.sender());
                    while let Some(byte) = uart.get() {
                        if chars.push_back(byte).is_err() {
                            log::warn!(
                                "uart{} receive queue overrun",
                                channel
                            );
                        }
                    }
                }
                _ => {
                    hl::reply_code(&sys, message.sender(), hl::BAD_OP);
                }
            }
            while !getters.is_empty() && !chars.is_empty() {
                let getter = getters.pop_front().unwrap();
                let byte = chars.pop_front().unwrap();
                let _ = userlib::sys_reply(&sys, getter, &[byte]);
            }
            Ok(())
        });
    }
}

/// Creates the transmit and receive servers for one channel.
pub fn start_channel(sys: &Sys, channel: usize, uart: Uart) {
    let tx_uart = uart.clone();
    create(sys, priority::SERVER_HIGH, move |sys| {
        transmit_server(sys, channel, tx_uart)
    })
    .unwrap_or_else(|e| panic!("creating uart{} tx: {}", channel, e));
    create(sys, priority::SERVER_HIGH, move |sys| {
        receive_server(sys, channel, uart)
    })
    .unwrap_or_else(|e| panic!("creating uart{} rx: {}", channel, e));
}
