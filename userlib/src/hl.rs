// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level server interface.
//!
//! Wire convention: every request starts with a 32-bit little-endian
//! operation code, followed by an operation-specific fixed-layout body.
//! [`recv`] decodes the code, hands the typed operation to the handler,
//! and rejects garbage on the server's behalf; [`Message::fixed`]
//! reinterprets the full request (header included) as a zerocopy struct.
//!
//! Error replies are a single little-endian `i32`, which is also the shape
//! of every scalar reply in the system, so clients read one word and
//! interpret negatives as failure.

use abi::TaskId;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use crate::{sys_receive, sys_reply, FromPrimitive, Sys};

/// Reply sent when the operation code doesn't decode. Conventionally
/// "bad operation".
pub const BAD_OP: i32 = -86;

/// Receives one request and handles it.
///
/// `buffer` must hold the largest request the server accepts. The handler
/// may reply immediately through the [`Caller`], park it for later, or
/// return `Err` to have an error code replied on its behalf.
pub fn recv<'a, O, E>(
    sys: &Sys,
    buffer: &'a mut [u8],
    handler: impl FnOnce(O, Message<'a>) -> Result<(), E>,
) where
    O: FromPrimitive,
    E: Into<i32>,
{
    let (sender, len) = sys_receive(sys, &mut *buffer);
    let view = &buffer[..len];
    let op = match view.get(..4) {
        Some(word) => u32::from_le_bytes(word.try_into().unwrap()),
        None => {
            reply_code(sys, sender, BAD_OP);
            return;
        }
    };
    match O::from_u32(op) {
        Some(op) => {
            let message = Message {
                buffer: view,
                sender,
            };
            if let Err(e) = handler(op, message) {
                reply_code(sys, sender, e.into());
            }
        }
        None => reply_code(sys, sender, BAD_OP),
    }
}

/// Replies a single `i32` code. The universal scalar reply.
pub fn reply_code(sys: &Sys, target: TaskId, code: i32) {
    let _ = sys_reply(sys, target, &code.to_le_bytes());
}

/// Replies with an empty message, for requests whose only answer is
/// "done".
pub fn reply_empty(sys: &Sys, target: TaskId) {
    let _ = sys_reply(sys, target, &[]);
}

/// A received request.
pub struct Message<'a> {
    buffer: &'a [u8],
    sender: TaskId,
}

impl<'a> Message<'a> {
    pub fn sender(&self) -> TaskId {
        self.sender
    }

    /// Parses this request as a fixed-size value of type `M` and prepares
    /// to (maybe, eventually) send a response of type `R`.
    ///
    /// Returns `None` if the caller sent a request whose size doesn't
    /// match `M` — too big or too small, both are protocol violations.
    pub fn fixed<M, R>(self) -> Option<(&'a M, Caller<R>)>
    where
        M: FromBytes + Unaligned,
        R: AsBytes,
    {
        if self.buffer.len() != core::mem::size_of::<M>() {
            return None;
        }
        let msg =
            LayoutVerified::<_, M>::new_unaligned(self.buffer)?.into_ref();
        Some((msg, Caller::from(self.sender)))
    }
}

/// A typed handle to a task, used to send a single reply of type `R`.
pub struct Caller<R> {
    id: TaskId,
    _phantom: core::marker::PhantomData<fn(R)>,
}

impl<R> From<TaskId> for Caller<R> {
    fn from(id: TaskId) -> Self {
        Caller {
            id,
            _phantom: core::marker::PhantomData,
        }
    }
}

impl<R> Caller<R> {
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    /// Sends the reply, consuming the handle.
    pub fn reply(self, sys: &Sys, message: R)
    where
        R: AsBytes,
    {
        let _ = sys_reply(sys, self.id, message.as_bytes());
    }

    /// Sends a failure code instead of an `R`, consuming the handle.
    pub fn reply_fail(self, sys: &Sys, code: i32) {
        reply_code(sys, self.id, code);
    }
}

/// Client-side pairing of `fixed`: sends a fixed-layout request and reads
/// a fixed-layout reply. Returns `None` if the reply size doesn't match
/// `R`, which means the peer isn't speaking this protocol.
pub fn send_fixed<M, R>(sys: &Sys, target: TaskId, request: &M) -> Option<R>
where
    M: AsBytes,
    R: FromBytes + AsBytes,
{
    let mut reply = R::new_zeroed();
    let n = crate::sys_send(sys, target, request.as_bytes(), reply.as_bytes_mut());
    if n == core::mem::size_of::<R>() as i32 {
        Some(reply)
    } else {
        None
    }
}
