// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name server round trips over real IPC.

use abi::{priority, Priority};
use kern::{BoardConfig, Kernel};
use task_names::api::{self, NameError};
use userlib::{create, kprintln, sys_my_tid};

fn quiet_board() -> BoardConfig {
    BoardConfig {
        tick_limit: Some(0),
        tick_ms: None,
    }
}

#[test]
fn register_and_look_up() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(priority::SUPERVISOR, |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();

        api::register_as(&sys, "rider").unwrap();
        assert_eq!(api::who_is(&sys, "rider"), Ok(sys_my_tid(&sys)));
        assert_eq!(api::who_is(&sys, "nobody"), Err(NameError::NotFound));

        // A more important child re-registers the name and has displaced
        // us by the time create returns.
        let usurper = create(&sys, Priority(4), |sys| {
            api::register_as(&sys, "rider").unwrap();
        })
        .unwrap();
        assert_eq!(api::who_is(&sys, "rider"), Ok(usurper));
        kprintln!(&sys, "names ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "names ok\n");
}

#[test]
fn resolve_spins_until_registration() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    // Root and provider share a priority level, so resolution genuinely
    // has to spin until the provider gets its turn.
    kernel.add_task(priority::WORKER, |sys| {
        create(&sys, priority::SERVER, task_names::name_server).unwrap();
        create(&sys, priority::WORKER, |sys| {
            api::register_as(&sys, "late.riser").unwrap();
            // Stay alive for the caller.
            let mut buffer = [0u8; 4];
            let (from, _) = userlib::sys_receive(&sys, &mut buffer);
            userlib::sys_reply(&sys, from, &[]);
        })
        .unwrap();
        let provider = task_names::resolve(&sys, "late.riser");
        assert_eq!(userlib::sys_send(&sys, provider, b"hi", &mut []), 0);
        kprintln!(&sys, "resolved");
    });
    let report = kernel.run();
    assert_eq!(report.console, "resolved\n");
}
