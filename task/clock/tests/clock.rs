// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clock server tests over real IPC and virtual time.

use abi::priority;
use kern::{BoardConfig, Kernel};
use task_clock::api::{self, ClockError};
use userlib::{create, kprintln};

fn board(ticks: u64) -> BoardConfig {
    BoardConfig {
        tick_limit: Some(ticks),
        tick_ms: None,
    }
}

#[test]
fn delays_wake_in_deadline_order() {
    let (mut kernel, _handle) = Kernel::new(board(200));
    kernel.add_task(priority::SUPERVISOR, |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        create(&sys, priority::SERVER_HIGH, task_clock::clock_server)
            .unwrap();
        for ticks in [30, 10, 20] {
            create(&sys, priority::WORKER, move |sys| {
                let clock =
                    task_names::resolve(&sys, api::CLOCK_SERVER_NAME);
                let woke = api::delay(&sys, clock, ticks).unwrap();
                kprintln!(&sys, "slept {} woke {}", ticks, woke);
            })
            .unwrap();
        }
    });
    let report = kernel.run();
    assert_eq!(
        report.console,
        "slept 10 woke 10\nslept 20 woke 20\nslept 30 woke 30\n"
    );
}

#[test]
fn time_and_delay_until() {
    let (mut kernel, _handle) = Kernel::new(board(100));
    kernel.add_task(priority::SUPERVISOR, |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        create(&sys, priority::SERVER_HIGH, task_clock::clock_server)
            .unwrap();
        let clock = task_names::resolve(&sys, api::CLOCK_SERVER_NAME);

        assert_eq!(api::time(&sys, clock), Ok(0));
        assert_eq!(api::delay_until(&sys, clock, 25), Ok(25));
        assert_eq!(api::time(&sys, clock), Ok(25));
        // A deadline already in the past returns immediately.
        assert_eq!(api::delay_until(&sys, clock, 5), Ok(25));
        kprintln!(&sys, "clock ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "clock ok\n");
}

#[test]
fn negative_arguments_are_refused() {
    let (mut kernel, _handle) = Kernel::new(board(50));
    kernel.add_task(priority::SUPERVISOR, |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        create(&sys, priority::SERVER_HIGH, task_clock::clock_server)
            .unwrap();
        let clock = task_names::resolve(&sys, api::CLOCK_SERVER_NAME);

        assert_eq!(api::delay(&sys, clock, -1), Err(ClockError::InvalidDelay));
        assert_eq!(
            api::delay_until(&sys, clock, -10),
            Err(ClockError::InvalidDelay)
        );
        kprintln!(&sys, "refused ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "refused ok\n");
}
