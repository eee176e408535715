// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event-layer tests: await/deliver, held interrupt lines, virtual time,
//! and the one-waiter-per-event rule.

use abi::{EventId, Priority};
use kern::{BoardConfig, Kernel};
use userlib::{kprintln, sys_await_event};

#[test]
fn timer_ticks_wake_the_waiter() {
    let (mut kernel, _handle) = Kernel::new(BoardConfig {
        tick_limit: Some(100),
        tick_ms: None,
    });
    kernel.add_task(Priority(0), |sys| {
        for round in 0..3 {
            sys_await_event(&sys, EventId::TimerTick);
            kprintln!(&sys, "tick {}", round);
        }
    });
    let report = kernel.run();
    assert_eq!(report.console, "tick 0\ntick 1\ntick 2\n");
    // Virtual time only advanced while someone was waiting on it.
    assert_eq!(report.now, 3);
    assert_eq!(report.stats.irqs_delivered, 3);
}

/// An interrupt that fires before its notifier awaits is held on the
/// line, not lost.
#[test]
fn early_input_is_held_until_awaited() {
    let (mut kernel, handle) = Kernel::new(BoardConfig {
        tick_limit: Some(0),
        tick_ms: None,
    });
    // Input lands before the kernel even starts dispatching.
    handle.uart0.feed(b"z");
    let uart0 = kernel.uart0();
    kernel.add_task(Priority(0), move |sys| {
        sys_await_event(&sys, EventId::Uart0Rx);
        let byte = uart0.get().unwrap();
        kprintln!(&sys, "got {}", byte as char);
    });
    let report = kernel.run();
    assert_eq!(report.console, "got z\n");
}

#[test]
#[should_panic(expected = "both awaiting")]
fn double_await_on_one_event_halts() {
    let (mut kernel, _handle) = Kernel::new(BoardConfig {
        tick_limit: Some(10),
        tick_ms: None,
    });
    for _ in 0..2 {
        kernel.add_task(Priority(1), |sys| {
            sys_await_event(&sys, EventId::TimerTick);
        });
    }
    kernel.run();
}
