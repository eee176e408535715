// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The track server: one task owning the authoritative switch state, the
//! per-node claims, and the wait-for sets.
//!
//! Three responsibilities: initialize a topology on demand, answer
//! routing queries, and arbitrate reservations. Physical switch commands
//! are a side effect of the latter two and leave through a courier pool,
//! so the request loop never blocks on the train controller.

use abi::priority;
use userlib::courier::{next_job, CourierPool};
use userlib::hl;
use userlib::{sys_my_parent_tid, Sys, TaskId};
use zerocopy::{AsBytes, LayoutVerified};

use crate::data::{
    build, canonical_switches, central_partner, switch_id, switch_slot,
    NUM_SWITCHES,
};
use crate::graph::TrackGraph;
use crate::reserve::Reservations;
use crate::rng::TrackRng;
use crate::route;
use crate::route::{BanSet, MAX_PATH};

pub mod api {
    //! Wire format and client stubs.

    use userlib::hl;
    use userlib::{Sys, TaskId};
    use zerocopy::{AsBytes, FromBytes, LittleEndian, Unaligned, U16, U32};

    pub use crate::data::{NUM_SWITCHES, TRACK_A, TRACK_B};
    pub use crate::route::MAX_PATH;

    pub const TRACK_SERVER_NAME: &str = "track.server";

    /// Most banned nodes one path query can carry.
    pub const MAX_BANNED: usize = 16;

    /// `dest` value in an `RngReply` when nothing is reachable.
    pub const NO_DEST: u16 = u16::MAX;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
    #[repr(u32)]
    pub enum Op {
        Init = 1,
        GetSwitchState = 2,
        SwitchSubscribe = 3,
        Switch = 4,
        GetPath = 5,
        Rng = 6,
        TryReserve = 7,
        Unreserve = 8,
        /// Courier-only: a forwarded switch command has been delivered.
        CourierComplete = 9,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PlainRequest {
        pub op: U32<LittleEndian>,
    }

    impl PlainRequest {
        pub fn new(op: Op) -> Self {
            Self {
                op: U32::new(op as u32),
            }
        }
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct InitRequest {
        pub op: U32<LittleEndian>,
        pub track: u8,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct SwitchRequest {
        pub op: U32<LittleEndian>,
        pub id: u8,
        pub dir: u8,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PathRequest {
        pub op: U32<LittleEndian>,
        pub src: U16<LittleEndian>,
        pub dst: U16<LittleEndian>,
        pub allow_reverse: u8,
        pub banned_len: u8,
        pub banned: [U16<LittleEndian>; MAX_BANNED],
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct RngRequest {
        pub op: U32<LittleEndian>,
        pub src: U16<LittleEndian>,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct ReserveRequest {
        pub op: U32<LittleEndian>,
        pub train: u8,
        pub len: u8,
        pub path: [U16<LittleEndian>; MAX_PATH],
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct SwitchStateReply {
        pub state: [u8; NUM_SWITCHES],
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct PathReply {
        pub successful: u8,
        pub reversing: u8,
        pub len: u8,
        pub rev_node: U16<LittleEndian>,
        pub rev_offset: U32<LittleEndian>,
        pub dist: U32<LittleEndian>,
        pub path: [U16<LittleEndian>; MAX_PATH],
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct RngReply {
        pub src: U16<LittleEndian>,
        pub dest: U16<LittleEndian>,
    }

    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct ReserveReply {
        pub successful: u8,
        pub dead_lock_detected: u8,
        pub res_dist: U32<LittleEndian>,
    }

    /// The courier's parking message and its job, shared shape.
    #[derive(FromBytes, AsBytes, Unaligned)]
    #[repr(C)]
    pub struct SwitchJob {
        pub id: u8,
        pub dir: u8,
    }

    pub fn track_tid(sys: &Sys) -> Option<TaskId> {
        task_names::api::who_is(sys, TRACK_SERVER_NAME).ok()
    }

    /// Loads a topology and resets switches to its canonical pattern.
    pub fn init(sys: &Sys, server: TaskId, track: u8) {
        let request = InitRequest {
            op: U32::new(Op::Init as u32),
            track,
        };
        let _: Option<[u8; 0]> = hl::send_fixed(sys, server, &request);
    }

    pub fn switch_state(sys: &Sys, server: TaskId) -> [u8; NUM_SWITCHES] {
        let request = PlainRequest::new(Op::GetSwitchState);
        let reply: SwitchStateReply = hl::send_fixed(sys, server, &request)
            .expect("track server gone");
        reply.state
    }

    /// Parks until the next switch change, then returns the full state.
    pub fn subscribe_switches(
        sys: &Sys,
        server: TaskId,
    ) -> [u8; NUM_SWITCHES] {
        let request = PlainRequest::new(Op::SwitchSubscribe);
        let reply: SwitchStateReply = hl::send_fixed(sys, server, &request)
            .expect("track server gone");
        reply.state
    }

    pub fn set_switch(sys: &Sys, server: TaskId, id: u8, dir: u8) {
        let request = SwitchRequest {
            op: U32::new(Op::Switch as u32),
            id,
            dir,
        };
        let _: Option<[u8; 0]> = hl::send_fixed(sys, server, &request);
    }

    /// A decoded path reply.
    #[derive(Clone, Debug)]
    pub struct PathOutcome {
        pub nodes: heapless::Vec<u16, MAX_PATH>,
        pub dist: u32,
        pub reverse_at: Option<(u16, u32)>,
    }

    pub fn get_path(
        sys: &Sys,
        server: TaskId,
        src: u16,
        dst: u16,
        allow_reverse: bool,
        banned: &[u16],
    ) -> Option<PathOutcome> {
        assert!(banned.len() <= MAX_BANNED);
        let mut request = PathRequest {
            op: U32::new(Op::GetPath as u32),
            src: U16::new(src),
            dst: U16::new(dst),
            allow_reverse: allow_reverse as u8,
            banned_len: banned.len() as u8,
            banned: [U16::new(0); MAX_BANNED],
        };
        for (slot, &b) in request.banned.iter_mut().zip(banned) {
            *slot = U16::new(b);
        }
        let reply: PathReply =
            hl::send_fixed(sys, server, &request).expect("track server gone");
        if reply.successful == 0 {
            return None;
        }
        let mut nodes = heapless::Vec::new();
        for slot in &reply.path[..usize::from(reply.len)] {
            nodes.push(slot.get()).ok()?;
        }
        Some(PathOutcome {
            nodes,
            dist: reply.dist.get(),
            reverse_at: (reply.reversing != 0)
                .then(|| (reply.rev_node.get(), reply.rev_offset.get())),
        })
    }

    pub fn random_dest(sys: &Sys, server: TaskId, src: u16) -> Option<u16> {
        let request = RngRequest {
            op: U32::new(Op::Rng as u32),
            src: U16::new(src),
        };
        let reply: RngReply =
            hl::send_fixed(sys, server, &request).expect("track server gone");
        (reply.dest.get() != NO_DEST).then(|| reply.dest.get())
    }

    /// A decoded reservation reply.
    #[derive(Copy, Clone, Debug)]
    pub struct ReserveOutcome {
        pub successful: bool,
        pub dead_lock_detected: bool,
        pub res_dist: u32,
    }

    fn path_request(op: Op, train: u8, path: &[u16]) -> ReserveRequest {
        assert!(path.len() <= MAX_PATH);
        let mut request = ReserveRequest {
            op: U32::new(op as u32),
            train,
            len: path.len() as u8,
            path: [U16::new(0); MAX_PATH],
        };
        for (slot, &step) in request.path.iter_mut().zip(path) {
            *slot = U16::new(step);
        }
        request
    }

    pub fn try_reserve(
        sys: &Sys,
        server: TaskId,
        train: u8,
        path: &[u16],
    ) -> ReserveOutcome {
        let request = path_request(Op::TryReserve, train, path);
        let reply: ReserveReply =
            hl::send_fixed(sys, server, &request).expect("track server gone");
        ReserveOutcome {
            successful: reply.successful != 0,
            dead_lock_detected: reply.dead_lock_detected != 0,
            res_dist: reply.res_dist.get(),
        }
    }

    pub fn unreserve(sys: &Sys, server: TaskId, train: u8, path: &[u16]) {
        let request = path_request(Op::Unreserve, train, path);
        let _: Option<[u8; 0]> = hl::send_fixed(sys, server, &request);
    }
}

/// Couriers in the switch-command pool; sized for the worst burst, a full
/// topology init.
const POOL_SIZE: usize = 32;

/// Parked switch-change subscribers.
const MAX_SUBSCRIBERS: usize = 4;

const SWITCH_JOB_LEN: usize = core::mem::size_of::<api::SwitchJob>();

fn track_courier(sys: Sys) {
    let parent = sys_my_parent_tid(&sys).unwrap();
    let admin = task_names::resolve(&sys, task_train::api::TRAIN_ADMIN_NAME);
    let done = api::PlainRequest::new(api::Op::CourierComplete);
    loop {
        let job = next_job::<_, SWITCH_JOB_LEN>(&sys, parent, &done);
        let job = LayoutVerified::<_, api::SwitchJob>::new_unaligned(
            job.as_slice(),
        )
        .expect("malformed switch job")
        .into_ref();
        task_train::api::throw_switch(&sys, admin, job.id, job.dir);
    }
}

struct SwitchBank {
    state: [u8; NUM_SWITCHES],
}

impl SwitchBank {
    /// Records a position; when it changes, hands the physical command to
    /// a courier and keeps the central pair complementary. Returns whether
    /// anything changed.
    fn pipe(
        &mut self,
        sys: &Sys,
        pool: &mut CourierPool<POOL_SIZE>,
        id: u8,
        dir: u8,
    ) -> bool {
        let slot = switch_slot(id);
        if self.state[slot] == dir {
            return false;
        }
        self.state[slot] = dir;
        pool.request(sys, &api::SwitchJob { id, dir });
        if let Some(partner) = central_partner(id) {
            let complement = if dir == b's' { b'c' } else { b's' };
            let partner_slot = switch_slot(partner);
            if self.state[partner_slot] != complement {
                self.state[partner_slot] = complement;
                pool.request(
                    sys,
                    &api::SwitchJob {
                        id: partner,
                        dir: complement,
                    },
                );
            }
        }
        true
    }
}

/// Server entry point.
pub fn track_server(sys: Sys) {
    task_names::api::register_as(&sys, api::TRACK_SERVER_NAME)
        .unwrap_or_else(|e| panic!("track server: {}", e));
    let mut pool: CourierPool<POOL_SIZE> =
        CourierPool::new(&sys, priority::COURIER, track_courier);

    let mut graph = build(api::TRACK_A);
    let mut reservations = Reservations::new(&graph);
    let mut switches = SwitchBank {
        state: [0; NUM_SWITCHES],
    };
    let mut subscribers: heapless::Deque<TaskId, MAX_SUBSCRIBERS> =
        heapless::Deque::new();
    let mut rng = TrackRng::new(0x7ac5);

    let mut buffer = [0; core::mem::size_of::<api::ReserveRequest>()];
    loop {
        hl::recv(&sys, &mut buffer, |op, message| -> Result<(), i32> {
            match op {
                api::Op::Init => {
                    let (request, caller) =
                        message.fixed::<api::InitRequest, [u8; 0]>().ok_or(-1)?;
                    graph = build(request.track);
                    reservations.reset(&graph);
                    let pattern = canonical_switches(request.track);
                    for slot in 0..NUM_SWITCHES {
                        switches.pipe(
                            &sys,
                            &mut pool,
                            switch_id(slot),
                            pattern[slot],
                        );
                    }
                    wake_subscribers(&sys, &mut subscribers, &switches);
                    caller.reply(&sys, []);
                }
                api::Op::GetSwitchState => {
                    let (_, caller) = message
                        .fixed::<api::PlainRequest, api::SwitchStateReply>()
                        .ok_or(-1)?;
                    caller.reply(
                        &sys,
                        api::SwitchStateReply {
                            state: switches.state,
                        },
                    );
                }
                api::Op::SwitchSubscribe => {
                    // Parked; replied at the next state change.
                    if subscribers.push_back(message.sender()).is_err() {
                        panic!("switch subscriber table full");
                    }
                }
                api::Op::Switch => {
                    let (request, caller) =
                        message.fixed::<api::SwitchRequest, [u8; 0]>().ok_or(-1)?;
                    let (id, dir) = (request.id, request.dir);
                    caller.reply(&sys, []);
                    if switches.pipe(&sys, &mut pool, id, dir) {
                        wake_subscribers(&sys, &mut subscribers, &switches);
                    }
                }
                api::Op::GetPath => {
                    let (request, caller) = message
                        .fixed::<api::PathRequest, api::PathReply>()
                        .ok_or(-1)?;
                    let reply = run_path_query(&graph, request);
                    caller.reply(&sys, reply);
                }
                api::Op::Rng => {
                    let (request, caller) = message
                        .fixed::<api::RngRequest, api::RngReply>()
                        .ok_or(-1)?;
                    let src = usize::from(request.src.get());
                    let dest = route::random_sensor_dest(&graph, src, &mut rng)
                        .map(|d| d as u16)
                        .unwrap_or(api::NO_DEST);
                    caller.reply(
                        &sys,
                        api::RngReply {
                            src: request.src,
                            dest: zerocopy::U16::new(dest),
                        },
                    );
                }
                api::Op::TryReserve => {
                    let (request, caller) = message
                        .fixed::<api::ReserveRequest, api::ReserveReply>()
                        .ok_or(-1)?;
                    let path = decode_path(request);
                    let outcome = reservations.try_reserve(
                        &mut graph,
                        &switches.state,
                        request.train,
                        &path,
                    );
                    let mut changed = false;
                    for &(id, dir) in &outcome.throws {
                        changed |= switches.pipe(&sys, &mut pool, id, dir);
                    }
                    if changed {
                        wake_subscribers(&sys, &mut subscribers, &switches);
                    }
                    caller.reply(
                        &sys,
                        api::ReserveReply {
                            successful: outcome.successful as u8,
                            dead_lock_detected: outcome.dead_lock_detected
                                as u8,
                            res_dist: zerocopy::U32::new(outcome.res_dist),
                        },
                    );
                }
                api::Op::Unreserve => {
                    let (request, caller) =
                        message.fixed::<api::ReserveRequest, [u8; 0]>().ok_or(-1)?;
                    let path = decode_path(request);
                    reservations.unreserve(&mut graph, request.train, &path);
                    caller.reply(&sys, []);
                }
                api::Op::CourierComplete => {
                    pool.receive(message.sender());
                }
            }
            Ok(())
        });
    }
}

fn decode_path(
    request: &api::ReserveRequest,
) -> heapless::Vec<u16, MAX_PATH> {
    let mut path = heapless::Vec::new();
    for slot in &request.path[..usize::from(request.len).min(MAX_PATH)] {
        // Capacity matches the wire array; push cannot fail.
        let _ = path.push(slot.get());
    }
    path
}

fn run_path_query(
    graph: &TrackGraph,
    request: &api::PathRequest,
) -> api::PathReply {
    let mut banned = BanSet::new();
    for slot in &request.banned[..usize::from(request.banned_len)
        .min(api::MAX_BANNED)]
    {
        let _ = banned.insert(slot.get());
    }
    let route = route::path_with_ban(
        graph,
        usize::from(request.src.get()),
        usize::from(request.dst.get()),
        &banned,
        request.allow_reverse != 0,
    );
    let mut reply = api::PathReply {
        successful: 0,
        reversing: 0,
        len: 0,
        rev_node: zerocopy::U16::new(0),
        rev_offset: zerocopy::U32::new(0),
        dist: zerocopy::U32::new(0),
        path: [zerocopy::U16::new(0); MAX_PATH],
    };
    if let Some(route) = route {
        reply.successful = 1;
        reply.len = route.nodes.len() as u8;
        reply.dist = zerocopy::U32::new(route.dist);
        for (slot, &step) in reply.path.iter_mut().zip(&route.nodes) {
            *slot = zerocopy::U16::new(step);
        }
        if let Some((node, offset)) = route.reverse_at {
            reply.reversing = 1;
            reply.rev_node = zerocopy::U16::new(node);
            reply.rev_offset = zerocopy::U32::new(offset);
        }
    }
    reply
}

fn wake_subscribers(
    sys: &Sys,
    subscribers: &mut heapless::Deque<TaskId, MAX_SUBSCRIBERS>,
    switches: &SwitchBank,
) {
    while let Some(subscriber) = subscribers.pop_front() {
        let _ = userlib::sys_reply(
            sys,
            subscriber,
            api::SwitchStateReply {
                state: switches.state,
            }
            .as_bytes(),
        );
    }
}
