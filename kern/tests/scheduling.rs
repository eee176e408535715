// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scheduling-order tests: strict priority preemption between entry
//! boundaries, FIFO within a level.

use abi::Priority;
use kern::{BoardConfig, Kernel, Sys};
use userlib::{create, kprintln, sys_my_parent_tid, sys_my_tid, sys_yield};

fn quiet_board() -> BoardConfig {
    BoardConfig {
        tick_limit: Some(0),
        tick_ms: None,
    }
}

fn sub_task(sys: Sys) {
    let id = sys_my_tid(&sys);
    let parent = sys_my_parent_tid(&sys).unwrap();
    kprintln!(&sys, "task {} parent {}", id.0, parent.0);
    sys_yield(&sys);
    kprintln!(&sys, "task {} parent {}", id.0, parent.0);
}

/// The create/exit cascade: two lower-priority children queue up behind
/// the creator, two higher-priority children preempt it at the create
/// boundary and run to completion first.
#[test]
fn create_exit_cascade() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(1), |sys| {
        kprintln!(&sys, "entered task 0");
        for priority in [2, 2, 0, 0] {
            let id = create(&sys, Priority(priority), sub_task).unwrap();
            kprintln!(&sys, "created task {}", id.0);
        }
        kprintln!(&sys, "exiting task 0");
    });
    let report = kernel.run();

    let expected = "\
entered task 0
created task 1
created task 2
task 3 parent 0
task 3 parent 0
created task 3
task 4 parent 0
task 4 parent 0
created task 4
exiting task 0
task 1 parent 0
task 2 parent 0
task 1 parent 0
task 2 parent 0
";
    assert_eq!(report.console, expected);
    for (id, state) in &report.task_states {
        assert_eq!(
            *state,
            kern::task::TaskState::Zombie,
            "task {} should have exited",
            id.0
        );
    }
}

/// A burst of creations at mixed priorities completes in a stable
/// priority-major FIFO order.
#[test]
fn burst_completes_priority_major() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    // The root is the most important task, so the whole burst queues up
    // before anything runs.
    kernel.add_task(Priority(0), |sys| {
        for priority in [3, 1, 2, 1, 3, 2, 1] {
            create(&sys, Priority(priority), move |sys| {
                kprintln!(&sys, "p{} t{}", priority, sys_my_tid(&sys).0);
            })
            .unwrap();
        }
    });
    let report = kernel.run();

    // Boot root is task 0; children get ids 1.. in creation order.
    let expected = "\
p1 t2
p1 t4
p1 t7
p2 t3
p2 t6
p3 t1
p3 t5
";
    assert_eq!(report.console, expected);
}

#[test]
fn yield_rotates_within_a_level() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(0), |sys| {
        for name in ["a", "b"] {
            create(&sys, Priority(2), move |sys| {
                for round in 0..3 {
                    kprintln!(&sys, "{}{}", name, round);
                    sys_yield(&sys);
                }
            })
            .unwrap();
        }
    });
    let report = kernel.run();
    assert_eq!(report.console, "a0\nb0\na1\nb1\na2\nb2\n");
}
