// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end track server test: the full IPC stack from a dispatcher
//! task through the reservation authority, couriers, the train admin,
//! and the UART server, down to command bytes on the simulated wire.

use abi::priority;
use kern::{BoardConfig, Kernel};
use task_track::data::{switch_slot, NUM_SWITCHES};
use task_track::server::api as track;
use userlib::{create, kprintln};

#[test]
fn dispatch_session_end_to_end() {
    let (mut kernel, handle) = Kernel::new(BoardConfig {
        tick_limit: Some(0),
        tick_ms: None,
    });

    let uart1 = kernel.uart1();
    kernel.add_task(priority::SUPERVISOR, move |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        task_uart::start_channel(&sys, 1, uart1);
        create(&sys, priority::SERVER, task_train::train_admin).unwrap();
        create(&sys, priority::SERVER, task_track::server::track_server)
            .unwrap();

        // A one-shot observer for switch changes.
        create(&sys, priority::WORKER, |sys| {
            let server = task_names::resolve(&sys, track::TRACK_SERVER_NAME);
            // First wake comes from the topology init.
            let state = track::subscribe_switches(&sys, server);
            assert_eq!(state[switch_slot(1)], b'c');
            assert_eq!(state[switch_slot(153)], b's');
            assert_eq!(state[switch_slot(154)], b'c');
            // Second wake: the explicit throw below.
            let state = track::subscribe_switches(&sys, server);
            assert_eq!(state[switch_slot(1)], b's');
            kprintln!(&sys, "observer ok");
        })
        .unwrap();

        let server = task_names::resolve(&sys, track::TRACK_SERVER_NAME);
        track::init(&sys, server, track::TRACK_A);

        let map = task_track::data::build(track::TRACK_A);
        let a1 = map.find("A1").unwrap() as u16;
        let c13 = map.find("C13").unwrap() as u16;

        let route = track::get_path(&sys, server, a1, c13, false, &[])
            .expect("route must exist");
        assert_eq!(route.dist, 600);
        assert_eq!(route.nodes.len(), 9);
        assert!(route.reverse_at.is_none());

        // Pull switch 1 off the route's direction, then watch the grant
        // throw it back.
        track::set_switch(&sys, server, 1, b's');
        let claim = track::try_reserve(&sys, server, 58, &route.nodes);
        assert!(claim.successful);
        assert!(!claim.dead_lock_detected);
        assert_eq!(claim.res_dist, 600);
        let state = track::switch_state(&sys, server);
        assert_eq!(state[switch_slot(1)], b'c');

        // A contender is refused without touching anything.
        let contested = track::try_reserve(&sys, server, 71, &route.nodes);
        assert!(!contested.successful);
        assert!(!contested.dead_lock_detected);
        assert_eq!(contested.res_dist, 0);

        // Release and let the contender take the head of the corridor.
        track::unreserve(&sys, server, 58, &route.nodes);
        let retry = track::try_reserve(&sys, server, 71, &route.nodes[..3]);
        assert!(retry.successful);

        kprintln!(&sys, "dispatch ok");
    });

    let report = kernel.run();
    assert!(report.console.contains("observer ok"));
    assert!(report.console.contains("dispatch ok"));

    // The wire carries two-byte commands: the init pattern (22 switches),
    // then the explicit throw of 1 to straight, then the grant's throw
    // back to curved.
    let wire = handle.uart1.take_output();
    assert_eq!(wire.len() % 2, 0);
    let commands: Vec<(u8, u8)> =
        wire.chunks(2).map(|c| (c[0], c[1])).collect();
    assert_eq!(commands.len(), NUM_SWITCHES + 2);
    // 0x21 throws straight, 0x20 curved.
    assert_eq!(&commands[NUM_SWITCHES..], &[(0x21, 1), (0x20, 1)]);
    for &(action, _) in &commands {
        assert!(action == 0x20 || action == 0x21);
    }
}
