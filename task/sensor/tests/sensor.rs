// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensor admin test: a dump fed to the simulated controller channel
//! reaches subscribers as a state change.

use abi::priority;
use kern::{BoardConfig, Kernel};
use task_sensor::api;
use userlib::{create, kprintln};

#[test]
fn fed_dump_reaches_subscribers() {
    let (mut kernel, handle) = Kernel::new(BoardConfig {
        tick_limit: Some(60),
        tick_ms: None,
    });
    // The controller's answer sits in the RX FIFO before boot; the
    // receive server will drain it when the first poll asks.
    let dump = [0, 0, 0x40, 0, 0, 0, 0, 0, 0, 1];
    handle.uart1.feed(&dump);

    let uart1 = kernel.uart1();
    kernel.add_task(priority::SUPERVISOR, move |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        create(&sys, priority::SERVER_HIGH, task_clock::clock_server)
            .unwrap();
        task_uart::start_channel(&sys, 1, uart1);
        create(&sys, priority::SERVER, task_sensor::sensor_admin).unwrap();

        let admin = task_names::resolve(&sys, api::SENSOR_ADMIN_NAME);
        // Blank until the first poll comes back.
        assert_eq!(
            api::sensor_state(&sys, admin),
            [0; api::NUM_SENSOR_BYTES]
        );
        let changed = api::await_change(&sys, admin);
        assert_eq!(changed, [0, 0, 0x40, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(api::sensor_state(&sys, admin), changed);
        kprintln!(&sys, "sensors ok");
    });
    let report = kernel.run();
    assert!(report.console.contains("sensors ok"));

    // The worker sent at least one dump query.
    let wire = handle.uart1.take_output();
    assert!(wire.contains(&api::SENSOR_DUMP_QUERY));
}
