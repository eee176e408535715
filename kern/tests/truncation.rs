// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property test for the rendezvous length contract: for arbitrary
//! message, receive-buffer, reply, and reply-buffer lengths, both sides
//! observe exactly the pairwise minima and the transferred prefixes.

use abi::{Priority, TaskId};
use kern::{BoardConfig, Kernel};
use proptest::prelude::*;
use userlib::{kprintln, sys_receive, sys_reply, sys_send};

const MAX_LEN: usize = 48;

fn pattern(len: usize, salt: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31) ^ salt).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rendezvous_lengths_are_pairwise_minima(
        msg_len in 0..=MAX_LEN,
        recv_cap in 0..=MAX_LEN,
        reply_len in 0..=MAX_LEN,
        reply_cap in 0..=MAX_LEN,
    ) {
        let (mut kernel, _handle) = Kernel::new(BoardConfig {
            tick_limit: Some(0),
            tick_ms: None,
        });

        kernel.add_task(Priority(1), move |sys| {
            let mut buffer = [0u8; MAX_LEN];
            let (from, n) = sys_receive(&sys, &mut buffer[..recv_cap]);
            assert_eq!(n, msg_len.min(recv_cap));
            assert_eq!(buffer[..n], pattern(msg_len, 0xa5)[..n]);
            assert_eq!(sys_reply(&sys, from, &pattern(reply_len, 0x3c)), 0);
        });
        kernel.add_task(Priority(2), move |sys| {
            let mut reply = [0u8; MAX_LEN];
            let n = sys_send(
                &sys,
                TaskId(0),
                &pattern(msg_len, 0xa5),
                &mut reply[..reply_cap],
            );
            assert_eq!(n, reply_len.min(reply_cap) as i32);
            let n = n as usize;
            assert_eq!(reply[..n], pattern(reply_len, 0x3c)[..n]);
            kprintln!(&sys, "ok");
        });

        let report = kernel.run();
        prop_assert_eq!(report.console, "ok\n");
    }
}
