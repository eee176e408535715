// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name server: a registry mapping short names to task ids.
//!
//! By convention the name server is the second task in the system (the
//! root boot task creates it before anything else), so every other task
//! can reach it at a well-known id and bootstrap the rest of its address
//! book from there.

use userlib::hl;
use userlib::{sys_my_tid, sys_yield, Sys, TaskId};

pub mod api {
    //! Wire format and client stubs.

    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, I32, U32};

    /// The name server's task id, fixed by boot order.
    pub const NAME_SERVER: TaskId = TaskId(1);

    /// Maximum name length, in bytes. Shorter names are zero-padded.
    pub const MAX_NAME: usize = 16;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        RegisterAs = 1,
        WhoIs = 2,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct NameRequest {
        pub op: U32<LittleEndian>,
        pub name: [u8; MAX_NAME],
    }

    pub type NameReply = I32<LittleEndian>;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
    pub enum NameError {
        #[error("name is not registered")]
        NotFound,
        #[error("name rejected by server")]
        Rejected,
        #[error("name server unreachable")]
        Unreachable,
    }

    pub fn pack_name(name: &str) -> [u8; MAX_NAME] {
        let mut packed = [0; MAX_NAME];
        let bytes = name.as_bytes();
        assert!(bytes.len() <= MAX_NAME, "name too long: {}", name);
        packed[..bytes.len()].copy_from_slice(bytes);
        packed
    }

    fn transact(sys: &Sys, op: Op, name: &str) -> Result<i32, NameError> {
        let request = NameRequest {
            op: U32::new(op as u32),
            name: pack_name(name),
        };
        let reply: NameReply =
            hl::send_fixed(sys, NAME_SERVER, &request)
                .ok_or(NameError::Unreachable)?;
        Ok(reply.get())
    }

    /// Registers the caller under `name`, displacing any prior owner.
    pub fn register_as(sys: &Sys, name: &str) -> Result<(), NameError> {
        match transact(sys, Op::RegisterAs, name)? {
            code if code >= 0 => Ok(()),
            _ => Err(NameError::Rejected),
        }
    }

    /// Looks up `name`.
    pub fn who_is(sys: &Sys, name: &str) -> Result<TaskId, NameError> {
        match transact(sys, Op::WhoIs, name)? {
            code if code >= 0 => Ok(TaskId(code as u16)),
            _ => Err(NameError::NotFound),
        }
    }
}

/// Registry capacity. Must be a power of two for the index map.
const MAX_NAMES: usize = 32;

/// Looks up `name`, yielding until it appears. For boot-time address-book
/// resolution, where registration order is a matter of task priority, not
/// of doubt.
pub fn resolve(sys: &Sys, name: &str) -> TaskId {
    loop {
        match api::who_is(sys, name) {
            Ok(id) => return id,
            Err(api::NameError::NotFound) => sys_yield(sys),
            Err(e) => panic!("resolving {}: {}", name, e),
        }
    }
}

/// Server entry point.
pub fn name_server(sys: Sys) {
    assert_eq!(
        sys_my_tid(&sys),
        api::NAME_SERVER,
        "name server must be created before all other tasks"
    );
    let mut registry: heapless::FnvIndexMap<[u8; api::MAX_NAME], TaskId, MAX_NAMES> =
        heapless::FnvIndexMap::new();
    let mut buffer = [0; core::mem::size_of::<api::NameRequest>()];

    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            let (request, caller) =
                message.fixed::<api::NameRequest, api::NameReply>().ok_or(-1)?;
            match op {
                api::Op::RegisterAs => {
                    let id = caller.task_id();
                    if registry.insert(request.name, id).is_err() {
                        log::warn!("name registry full");
                        caller.reply_fail(&sys, -1);
                    } else {
                        caller.reply(&sys, api::NameReply::new(i32::from(id.0)));
                    }
                }
                api::Op::WhoIs => match registry.get(&request.name) {
                    Some(id) => {
                        caller.reply(&sys, api::NameReply::new(i32::from(id.0)));
                    }
                    None => caller.reply_fail(&sys, -1),
                },
            }
            Ok(())
        });
    }
}
