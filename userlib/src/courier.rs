// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Courier pool.
//!
//! A server that must forward a message without blocking its own request
//! loop hands the blocking sends to a pool of courier tasks. A courier
//! parks by sending a completion message to its parent and waiting for the
//! reply; the parent's reply carries the next job. So the courier loop is:
//!
//! ```text
//! loop {
//!     job = send(parent, DONE)      // parked here while idle
//!     send(downstream, job)         // the blocking forward
//! }
//! ```
//!
//! The parent files the completion under its normal receive loop
//! ([`CourierPool::receive`]) and assigns work with
//! [`CourierPool::request`], which replies the job to a parked courier.
//! Every job eventually produces another completion, so the free list
//! regenerates. The pool is sized so that it never runs dry; running dry
//! means the server's fan-out outpaces its own capacity planning and is
//! fatal.

use abi::{Priority, TaskId};
use zerocopy::AsBytes;

use crate::{create, sys_send, Sys};

pub struct CourierPool<const N: usize> {
    free: heapless::Deque<TaskId, N>,
}

impl<const N: usize> CourierPool<N> {
    /// Creates the pool's couriers at the given priority. The free list
    /// starts empty and fills as the couriers' first completion messages
    /// arrive through the parent's receive loop.
    pub fn new(sys: &Sys, priority: Priority, courier: fn(Sys)) -> Self {
        for _ in 0..N {
            create(sys, priority, courier)
                .unwrap_or_else(|e| panic!("creating courier: {}", e));
        }
        Self {
            free: heapless::Deque::new(),
        }
    }

    /// Files a completion message from `courier`, returning it to the
    /// free list. The courier stays parked until its next job.
    pub fn receive(&mut self, courier: TaskId) {
        if self.free.push_back(courier).is_err() {
            panic!("courier {} completed twice", courier.0);
        }
    }

    /// Assigns `job` to an idle courier and marks it busy.
    pub fn request<M: AsBytes>(&mut self, sys: &Sys, job: &M) -> TaskId {
        let courier = self
            .free
            .pop_front()
            .unwrap_or_else(|| panic!("courier pool exhausted"));
        let code = crate::sys_reply(sys, courier, job.as_bytes());
        if code != 0 {
            panic!("courier {} rejected job: {}", courier.0, code);
        }
        courier
    }

    pub fn idle_count(&self) -> usize {
        self.free.len()
    }
}

/// Body of the parking send a courier performs between jobs. Returns the
/// next job, decoded into `J`'s byte representation; the courier supplies
/// the completion message `done`.
pub fn next_job<D: AsBytes, const JOB: usize>(
    sys: &Sys,
    parent: TaskId,
    done: &D,
) -> heapless::Vec<u8, JOB> {
    let mut buffer = [0u8; JOB];
    let n = sys_send(sys, parent, done.as_bytes(), &mut buffer);
    if n < 0 {
        // Parent died; nothing left to forward for.
        panic!("courier orphaned: {}", n);
    }
    heapless::Vec::from_slice(&buffer[..n as usize]).unwrap()
}
