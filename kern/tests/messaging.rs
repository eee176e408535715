// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rendezvous tests: truncation minima, reply pairing, inbox ordering,
//! and the response codes around dead peers.

use abi::{Priority, TaskId, NOT_WAITING_FOR_REPLY, NO_SUCH_TASK, PEER_EXITED};
use kern::{BoardConfig, Kernel};
use userlib::{
    create, kprintln, sys_receive, sys_reply, sys_send, CreateError,
};

fn quiet_board() -> BoardConfig {
    BoardConfig {
        tick_limit: Some(0),
        tick_ms: None,
    }
}

/// The producer/consumer scenario: "hello" into a 3-byte buffer leaves
/// the receiver with "hel" and 3; an empty reply unblocks the sender
/// with 0.
#[test]
fn rendezvous_truncates_silently() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    // Consumer boots first (task 0) and parks in receive.
    kernel.add_task(Priority(1), |sys| {
        let mut buffer = [0u8; 3];
        let (from, n) = sys_receive(&sys, &mut buffer);
        assert_eq!(n, 3);
        assert_eq!(&buffer, b"hel");
        assert_eq!(sys_reply(&sys, from, &[]), 0);
        kprintln!(&sys, "consumer done");
    });
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 8];
        let n = sys_send(&sys, TaskId(0), b"hello", &mut reply);
        assert_eq!(n, 0);
        kprintln!(&sys, "producer done");
    });
    let report = kernel.run();
    assert_eq!(report.console, "consumer done\nproducer done\n");
}

/// A reply longer than the sender's reply buffer arrives truncated, and
/// the sender sees the truncated length.
#[test]
fn reply_truncates_to_sender_capacity() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(1), |sys| {
        let mut buffer = [0u8; 16];
        let (from, _) = sys_receive(&sys, &mut buffer);
        assert_eq!(sys_reply(&sys, from, b"0123456789"), 0);
    });
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 4];
        let n = sys_send(&sys, TaskId(0), b"q", &mut reply);
        assert_eq!(n, 4);
        assert_eq!(&reply, b"0123");
        kprintln!(&sys, "ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "ok\n");
}

/// A single send is satisfied by exactly one reply.
#[test]
fn second_reply_is_refused() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(1), |sys| {
        let mut buffer = [0u8; 8];
        let (from, _) = sys_receive(&sys, &mut buffer);
        assert_eq!(sys_reply(&sys, from, b"one"), 0);
        assert_eq!(sys_reply(&sys, from, b"two"), NOT_WAITING_FOR_REPLY);
        kprintln!(&sys, "receiver done");
    });
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 8];
        let n = sys_send(&sys, TaskId(0), b"x", &mut reply);
        assert_eq!(n, 3);
        assert_eq!(&reply[..3], b"one");
    });
    kernel.run();
}

/// Two senders queue in the receiver's inbox in send order.
#[test]
fn inbox_preserves_send_order() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    // Receiver is least important: both sends park before it runs.
    kernel.add_task(Priority(1), |sys| {
        let mut reply = [0u8; 1];
        sys_send(&sys, TaskId(2), b"from-a", &mut reply);
    });
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 1];
        sys_send(&sys, TaskId(2), b"from-b", &mut reply);
    });
    kernel.add_task(Priority(3), |sys| {
        let mut buffer = [0u8; 8];
        let (first, _) = sys_receive(&sys, &mut buffer);
        assert_eq!(first, TaskId(0));
        assert_eq!(&buffer[..6], b"from-a");
        sys_reply(&sys, first, &[]);
        let (second, _) = sys_receive(&sys, &mut buffer);
        assert_eq!(second, TaskId(1));
        assert_eq!(&buffer[..6], b"from-b");
        sys_reply(&sys, second, &[]);
        kprintln!(&sys, "in order");
    });
    let report = kernel.run();
    assert_eq!(report.console, "in order\n");
}

/// Ids that were never allocated and ids of exited tasks both report
/// no-such-task.
#[test]
fn dead_and_bogus_ids_alike() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 1];
        assert_eq!(sys_send(&sys, TaskId(55), b"?", &mut reply), NO_SUCH_TASK);

        // A child that exits immediately.
        let child = create(&sys, Priority(1), |_| {}).unwrap();
        assert_eq!(
            sys_send(&sys, child, b"?", &mut reply),
            NO_SUCH_TASK
        );
        assert_eq!(sys_reply(&sys, TaskId(55), b"?"), NO_SUCH_TASK);
        kprintln!(&sys, "codes ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "codes ok\n");
}

/// A sender blocked on a task that exits is resumed with the peer-exited
/// code, whether or not its message was picked up.
#[test]
fn peer_exit_unblocks_senders() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    // Task 0 is least important: both senders park before it receives
    // one message and exits without replying.
    kernel.add_task(Priority(3), |sys| {
        let mut buffer = [0u8; 8];
        let _ = sys_receive(&sys, &mut buffer);
    });
    // Task 1's message is consumed but never answered.
    kernel.add_task(Priority(1), |sys| {
        let mut reply = [0u8; 1];
        assert_eq!(
            sys_send(&sys, TaskId(0), b"taken", &mut reply),
            PEER_EXITED
        );
        kprintln!(&sys, "reply-blocked ok");
    });
    // Task 2's message is never even received.
    kernel.add_task(Priority(2), |sys| {
        let mut reply = [0u8; 1];
        assert_eq!(
            sys_send(&sys, TaskId(0), b"parked", &mut reply),
            PEER_EXITED
        );
        kprintln!(&sys, "send-blocked ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "reply-blocked ok\nsend-blocked ok\n");
}

#[test]
fn create_rejects_bad_priority_and_full_pool() {
    let (mut kernel, _handle) = Kernel::new(quiet_board());
    kernel.add_task(Priority(0), |sys| {
        assert_eq!(
            create(&sys, Priority(abi::NUM_PRIORITIES as u8), |_| {}),
            Err(CreateError::InvalidPriority)
        );
        // Fill the remainder of the pool, then one more.
        for _ in 1..abi::MAX_TASKS {
            create(&sys, Priority(7), |_| {}).unwrap();
        }
        assert_eq!(
            create(&sys, Priority(7), |_| {}),
            Err(CreateError::PoolExhausted)
        );
        kprintln!(&sys, "limits ok");
    });
    let report = kernel.run();
    assert_eq!(report.console, "limits ok\n");
    assert_eq!(report.stats.tasks_created, abi::MAX_TASKS as u64);
}
