// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated board: virtual timer, two UARTs, console, interrupt latch.
//!
//! Tasks reach the UART "registers" through cloneable [`Uart`] handles,
//! the same way drivers on real hardware reach MMIO: device access is not
//! a suspension point. Interrupt conditions latch into a shared status
//! word that the kernel polls at activation boundaries.
//!
//! Time is virtual. The clock only advances when the kernel is idle (no
//! runnable task), one tick at a time, which keeps every run deterministic
//! and lets tests script timing exactly. The demo can additionally pace
//! ticks against the wall clock.

use std::sync::{Arc, Mutex};

use abi::EventId;

bitflags::bitflags! {
    /// Pending interrupt lines.
    pub struct IrqStatus: u32 {
        const TIMER           = 1 << 0;
        const UART0_RX        = 1 << 1;
        const UART0_TX        = 1 << 2;
        const UART1_RX        = 1 << 3;
        const UART1_TX        = 1 << 4;
        const UART1_CTS       = 1 << 5;
        const UART1_RX_TIMEOUT = 1 << 6;
    }
}

/// Latch ordering used when converting pending lines to events. Timer
/// first, then channel 0, then channel 1.
const IRQ_ORDER: [(IrqStatus, EventId); 7] = [
    (IrqStatus::TIMER, EventId::TimerTick),
    (IrqStatus::UART0_RX, EventId::Uart0Rx),
    (IrqStatus::UART0_TX, EventId::Uart0Tx),
    (IrqStatus::UART1_RX, EventId::Uart1Rx),
    (IrqStatus::UART1_TX, EventId::Uart1Tx),
    (IrqStatus::UART1_CTS, EventId::Uart1Cts),
    (IrqStatus::UART1_RX_TIMEOUT, EventId::Uart1RxTimeout),
];

const RX_FIFO_DEPTH: usize = 64;
const TX_FIFO_DEPTH: usize = 16;

#[derive(Clone)]
struct IrqLatch(Arc<Mutex<IrqStatus>>);

impl IrqLatch {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(IrqStatus::empty())))
    }

    fn raise(&self, bits: IrqStatus) {
        *self.0.lock().unwrap() |= bits;
    }

    fn peek(&self) -> IrqStatus {
        *self.0.lock().unwrap()
    }

    fn clear(&self, bits: IrqStatus) {
        self.0.lock().unwrap().remove(bits);
    }
}

/// Which latch bits a UART instance drives.
#[derive(Copy, Clone)]
struct UartIrqs {
    rx: IrqStatus,
    tx: IrqStatus,
    cts: IrqStatus,
}

struct UartInner {
    rx: heapless::Deque<u8, RX_FIFO_DEPTH>,
    tx: heapless::Deque<u8, TX_FIFO_DEPTH>,
    /// Bytes the simulated wire has carried away, visible to the host.
    drained: Vec<u8>,
    /// Clear-to-send. Only meaningful with flow control; drops after every
    /// accepted byte and reasserts when the byte drains.
    cts: bool,
    /// A writer found the FIFO full and wants a TX interrupt when space
    /// opens up.
    tx_irq_armed: bool,
    flow_control: bool,
    irqs: UartIrqs,
    latch: IrqLatch,
}

/// Cloneable handle to one simulated UART. Task side: `try_put`, `get`,
/// `cts`. Host side: `feed`, `take_output`.
#[derive(Clone)]
pub struct Uart(Arc<Mutex<UartInner>>);

impl Uart {
    fn new(flow_control: bool, irqs: UartIrqs, latch: IrqLatch) -> Self {
        Self(Arc::new(Mutex::new(UartInner {
            rx: heapless::Deque::new(),
            tx: heapless::Deque::new(),
            drained: Vec::new(),
            cts: true,
            tx_irq_armed: false,
            flow_control,
            irqs,
            latch,
        })))
    }

    /// Attempts to write one byte into the transmit FIFO. Returns `false`
    /// if the FIFO is full (a TX interrupt is armed) or, on a
    /// flow-controlled channel, if CTS is low (wait for the CTS event).
    pub fn try_put(&self, byte: u8) -> bool {
        let mut u = self.0.lock().unwrap();
        if u.flow_control && !u.cts {
            return false;
        }
        if u.tx.push_back(byte).is_err() {
            u.tx_irq_armed = true;
            return false;
        }
        if u.flow_control {
            u.cts = false;
        }
        true
    }

    /// Pops one byte from the receive FIFO.
    pub fn get(&self) -> Option<u8> {
        self.0.lock().unwrap().rx.pop_front()
    }

    pub fn cts(&self) -> bool {
        self.0.lock().unwrap().cts
    }

    /// Host side: delivers bytes to the receive FIFO and raises the RX
    /// interrupt. Bytes beyond the FIFO depth are dropped, as they would
    /// be by the hardware.
    pub fn feed(&self, bytes: &[u8]) {
        let mut u = self.0.lock().unwrap();
        for &b in bytes {
            if u.rx.push_back(b).is_err() {
                log::warn!("uart rx overrun, dropping byte {:#x}", b);
            }
        }
        let bits = u.irqs.rx;
        u.latch.raise(bits);
    }

    /// Host side: takes everything the wire has carried so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.lock().unwrap().drained)
    }

    fn rx_pending(&self) -> bool {
        !self.0.lock().unwrap().rx.is_empty()
    }

    /// Board service: carries queued TX bytes away and re-raises the
    /// interrupt lines this implies.
    fn service(&self) {
        let mut u = self.0.lock().unwrap();
        let mut moved = 0;
        while let Some(b) = u.tx.pop_front() {
            u.drained.push(b);
            moved += 1;
        }
        if moved > 0 {
            if u.tx_irq_armed {
                u.tx_irq_armed = false;
                let bits = u.irqs.tx;
                u.latch.raise(bits);
            }
            if u.flow_control && !u.cts {
                u.cts = true;
                let bits = u.irqs.cts;
                u.latch.raise(bits);
            }
        }
    }
}

#[derive(Clone)]
struct Console(Arc<Mutex<Vec<u8>>>);

/// Board configuration.
#[derive(Clone, Debug)]
pub struct BoardConfig {
    /// Stop issuing timer interrupts after this many ticks. Bounds every
    /// test run; `None` runs until the task set goes quiescent on its own.
    pub tick_limit: Option<u64>,
    /// Pace idle ticks against the wall clock (milliseconds per tick).
    /// `None` advances virtual time as fast as possible.
    pub tick_ms: Option<u64>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            tick_limit: Some(10_000),
            tick_ms: None,
        }
    }
}

/// Host-side view of the board, for feeding input and inspecting output
/// while or after the kernel runs.
#[derive(Clone)]
pub struct BoardHandle {
    pub uart0: Uart,
    pub uart1: Uart,
    console: Console,
}

impl BoardHandle {
    /// Contents of the kernel console (everything `KernelPrint` wrote).
    pub fn console(&self) -> String {
        String::from_utf8_lossy(&self.console.0.lock().unwrap()).into_owned()
    }
}

/// The simulated hardware owned by the kernel.
pub struct Board {
    cfg: BoardConfig,
    now: u64,
    latch: IrqLatch,
    uart0: Uart,
    uart1: Uart,
    console: Console,
}

impl Board {
    pub fn new(cfg: BoardConfig) -> (Self, BoardHandle) {
        let latch = IrqLatch::new();
        let uart0 = Uart::new(
            false,
            UartIrqs {
                rx: IrqStatus::UART0_RX,
                tx: IrqStatus::UART0_TX,
                cts: IrqStatus::empty(),
            },
            latch.clone(),
        );
        let uart1 = Uart::new(
            true,
            UartIrqs {
                rx: IrqStatus::UART1_RX,
                tx: IrqStatus::UART1_TX,
                cts: IrqStatus::UART1_CTS,
            },
            latch.clone(),
        );
        let console = Console(Arc::new(Mutex::new(Vec::new())));
        let handle = BoardHandle {
            uart0: uart0.clone(),
            uart1: uart1.clone(),
            console: console.clone(),
        };
        let board = Self {
            cfg,
            now: 0,
            latch,
            uart0,
            uart1,
            console,
        };
        (board, handle)
    }

    /// Current virtual time, in ticks.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn uart0(&self) -> Uart {
        self.uart0.clone()
    }

    pub fn uart1(&self) -> Uart {
        self.uart1.clone()
    }

    pub fn uart1_rx_pending(&self) -> bool {
        self.uart1.rx_pending()
    }

    /// Services the devices, which may raise further interrupt lines.
    pub fn service(&mut self) {
        self.uart0.service();
        self.uart1.service();
    }

    /// Pending interrupt lines, in latch order. Lines stay pending until
    /// acknowledged, so an interrupt that fires while its notifier is off
    /// doing something else is held, not lost.
    pub fn pending_events(&self) -> heapless::Vec<EventId, 8> {
        let pending = self.latch.peek();
        let mut events = heapless::Vec::new();
        for (bit, event) in IRQ_ORDER {
            if pending.contains(bit) {
                // Capacity matches the line count; push cannot fail.
                let _ = events.push(event);
            }
        }
        events
    }

    /// Acknowledges (clears) one pending line.
    pub fn ack(&self, event: EventId) {
        for (bit, e) in IRQ_ORDER {
            if e == event {
                self.latch.clear(bit);
            }
        }
    }

    /// Advances virtual time by one tick, raising the timer interrupt and
    /// the channel-1 receive timeout if bytes are sitting in its FIFO.
    /// Returns `false` once the configured tick limit is reached.
    pub fn advance_time(&mut self) -> bool {
        if let Some(limit) = self.cfg.tick_limit {
            if self.now >= limit {
                return false;
            }
        }
        if let Some(ms) = self.cfg.tick_ms {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }
        self.now += 1;
        self.latch.raise(IrqStatus::TIMER);
        if self.uart1.rx_pending() {
            self.latch.raise(IrqStatus::UART1_RX_TIMEOUT);
        }
        true
    }

    /// Appends bytes to the kernel console.
    pub fn console_write(&self, bytes: &[u8]) {
        self.console.0.lock().unwrap().extend_from_slice(bytes);
    }

    /// Console contents as text.
    pub fn console_snapshot(&self) -> String {
        String::from_utf8_lossy(&self.console.0.lock().unwrap()).into_owned()
    }
}
