// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Track reservations.
//!
//! Exclusive claims on directional nodes, handed out atomically for a path
//! plus a safety look-ahead. A claim covers a node and its reverse twin;
//! the twins' `reserved_by` fields are always equal and their directions
//! mirror-paired.
//!
//! Failure mutates nothing except the requesting train's wait-for set,
//! which records what it wanted and could not get. That set feeds the
//! deadlock probe: when a node is contended, the probe asks whether the
//! current owner is in turn waiting on anything the requester holds -- a
//! two-cycle in the wait-for graph. Longer cycles are not detected; the
//! central-junction exclusion linearises the hardest contention area
//! instead.

use crate::data::{switch_slot, NUM_SWITCHES};
use crate::graph::{
    NodeIdx, NodeKind, ReserveDir, TrackGraph, DIR_AHEAD, DIR_CURVED,
    DIR_STRAIGHT,
};

/// Look-ahead distance past the end of a requested path. Sized so a train
/// braking from its calibrated speeds cannot overshoot into territory it
/// does not hold.
pub const SAFETY_DISTANCE: u32 = 200;

/// Concurrently tracked trains.
pub const MAX_TRAINS: usize = 8;

/// Longest look-ahead, in nodes, that `SAFETY_DISTANCE` can cover.
const MAX_LOOKAHEAD: usize = 16;

pub type WantedSet = heapless::FnvIndexSet<u16, 256>;

/// Result of a reservation attempt.
#[derive(Clone, Debug, Default)]
pub struct ReserveOutcome {
    pub successful: bool,
    pub dead_lock_detected: bool,
    /// Distance covered by the requested path, branch legs included.
    pub res_dist: u32,
    /// Switch positions the grant implies, in path order, for the server
    /// to pipe to the hardware.
    pub throws: heapless::Vec<(u8, u8), 16>,
}

pub struct Reservations {
    wanted: heapless::FnvIndexMap<u8, WantedSet, MAX_TRAINS>,
    central: [NodeIdx; 4],
}

impl Reservations {
    pub fn new(graph: &TrackGraph) -> Self {
        Self {
            wanted: heapless::FnvIndexMap::new(),
            central: graph.central_branches(),
        }
    }

    /// Rebinds to a freshly built topology.
    pub fn reset(&mut self, graph: &TrackGraph) {
        self.wanted.clear();
        self.central = graph.central_branches();
    }

    pub fn wanted_nodes(&self, train: u8) -> Option<&WantedSet> {
        self.wanted.get(&train)
    }

    fn wanted_mut(&mut self, train: u8) -> &mut WantedSet {
        if !self.wanted.contains_key(&train) {
            self.wanted
                .insert(train, WantedSet::new())
                .ok()
                .expect("more trains than the wait-for table holds");
        }
        self.wanted.get_mut(&train).unwrap()
    }

    /// Attempts atomic acquisition of every node on `path`, plus the
    /// nodes a train could roll into within [`SAFETY_DISTANCE`] past the
    /// end, following current switch positions.
    pub fn try_reserve(
        &mut self,
        graph: &mut TrackGraph,
        switches: &[u8; NUM_SWITCHES],
        train: u8,
        path: &[u16],
    ) -> ReserveOutcome {
        let mut outcome = ReserveOutcome {
            successful: true,
            ..Default::default()
        };
        self.wanted_mut(train).clear();

        for &step in path {
            if self.robustness_failed(graph, &mut outcome, step.into(), train)
            {
                break;
            }
        }

        // Walk on past the path until the safety distance is covered,
        // applying the same checks. Branches follow their current
        // position; the walk ends early at the installation's edge.
        let mut lookahead = heapless::Vec::<u16, MAX_LOOKAHEAD>::new();
        if let Some(&last) = path.last() {
            let mut at: NodeIdx = last.into();
            let mut covered: u32 = 0;
            while outcome.successful && covered < SAFETY_DISTANCE {
                let node = graph.node(at);
                let edge = match node.kind {
                    NodeKind::Sensor | NodeKind::Merge | NodeKind::Enter => {
                        node.edge(DIR_AHEAD)
                    }
                    NodeKind::Branch => {
                        let slot =
                            match switches[switch_slot(node.num)] {
                                b's' => DIR_STRAIGHT,
                                b'c' => DIR_CURVED,
                                other => panic!(
                                    "switch {} in impossible position {:#x}",
                                    node.num, other
                                ),
                            };
                        node.edge(slot)
                    }
                    NodeKind::Exit | NodeKind::None => None,
                };
                let Some(edge) = edge else { break };
                covered += edge.dist;
                at = edge.dest;
                if lookahead.push(at as u16).is_err() {
                    panic!("safety look-ahead exceeds {} nodes", MAX_LOOKAHEAD);
                }
                if self.robustness_failed(graph, &mut outcome, at, train) {
                    break;
                }
            }
        }

        if !outcome.successful {
            return outcome;
        }

        self.wanted_mut(train).clear();
        for (i, &step) in path.iter().enumerate() {
            let index: NodeIdx = step.into();
            reserve_node(graph, index, train);
            let node = graph.node(index);
            if node.kind == NodeKind::Branch {
                // Throw the switch toward the next node on the path. A
                // branch at the very end has nothing to aim at; the
                // look-ahead already walked its current position.
                if let Some(&next) = path.get(i + 1) {
                    let straight = node.edge(DIR_STRAIGHT).unwrap();
                    let curved = node.edge(DIR_CURVED).unwrap();
                    let (dir, dist) = if straight.dest == usize::from(next) {
                        (b's', straight.dist)
                    } else if curved.dest == usize::from(next) {
                        (b'c', curved.dist)
                    } else {
                        panic!(
                            "path leaves branch {} toward a non-neighbour",
                            node.name
                        );
                    };
                    outcome
                        .throws
                        .push((node.num, dir))
                        .ok()
                        .expect("more throws than a path can hold");
                    outcome.res_dist += dist;
                }
            } else if i != path.len() - 1 {
                if let Some(edge) = node.edge(DIR_AHEAD) {
                    outcome.res_dist += edge.dist;
                }
            }
        }
        for &step in &lookahead {
            reserve_node(graph, step.into(), train);
        }
        outcome
    }

    /// Releases the listed nodes. Each must be held by `train`; anything
    /// else is a supervisor state-machine bug and halts.
    pub fn unreserve(
        &mut self,
        graph: &mut TrackGraph,
        train: u8,
        path: &[u16],
    ) {
        for &step in path {
            cancel_reserve(graph, step.into(), train);
        }
    }

    /// One node's worth of reservation checks. Returns `true` on failure,
    /// with `outcome` updated; the only mutation is to the wait-for set.
    fn robustness_failed(
        &mut self,
        graph: &TrackGraph,
        outcome: &mut ReserveOutcome,
        index: NodeIdx,
        train: u8,
    ) -> bool {
        let _ = self.wanted_mut(train).insert(index as u16);
        if !can_reserve(graph, index, train) {
            outcome.dead_lock_detected |=
                self.deadlock_with(graph, index, train);
            outcome.successful = false;
            return true;
        }

        let node = graph.node(index);
        // A branch claims both onward legs; a merge claims both legs its
        // twin branch fans into. One redundant check either way is fine.
        let blocked = match node.kind {
            NodeKind::Branch => branch_safety(graph, index, train),
            NodeKind::Merge => {
                branch_safety(graph, graph.reverse_of(index), train)
            }
            _ => None,
        };
        if let Some(blocked) = blocked {
            outcome.dead_lock_detected |=
                self.deadlock_with(graph, blocked, train);
            outcome.successful = false;
            return true;
        }

        // The central junction admits one train, whole. Too many edge
        // cases live in there otherwise.
        if (153..=156).contains(&node.num) {
            if let Some(blocked) = self.central_safety(graph, train) {
                let central = self.central;
                let wanted = self.wanted_mut(train);
                for index in central {
                    let _ = wanted.insert(index as u16);
                }
                outcome.dead_lock_detected |=
                    self.deadlock_with(graph, blocked, train);
                outcome.successful = false;
                return true;
            }
        }
        false
    }

    /// First unreservable destination of any central-junction branch.
    fn central_safety(
        &self,
        graph: &TrackGraph,
        train: u8,
    ) -> Option<NodeIdx> {
        self.central
            .iter()
            .find_map(|&branch| branch_safety(graph, branch, train))
    }

    /// Two-cycle probe: `index` is held by some other train; does that
    /// train's wait-for set name anything `train` holds, directly or
    /// through a twin?
    fn deadlock_with(
        &self,
        graph: &TrackGraph,
        index: NodeIdx,
        train: u8,
    ) -> bool {
        let owner = match graph.node(index).reserved_by {
            Some(owner) => owner,
            None => panic!(
                "unreserved node {} treated as contended",
                graph.node(index).name
            ),
        };
        let Some(wanted) = self.wanted.get(&owner) else {
            return false;
        };
        let cycle = wanted.iter().any(|&w| {
            let w: NodeIdx = w.into();
            graph.node(w).reserved_by == Some(train)
                || graph.node(graph.reverse_of(w)).reserved_by == Some(train)
        });
        if cycle {
            log::debug!(
                "wait cycle: train {} holds {}, owner {} wants it back",
                train,
                graph.node(index).name,
                owner
            );
        }
        cycle
    }
}

fn can_reserve(graph: &TrackGraph, index: NodeIdx, train: u8) -> bool {
    match graph.node(index).reserved_by {
        None => true,
        Some(owner) => owner == train,
    }
}

/// First destination of `branch` that `train` cannot claim.
fn branch_safety(
    graph: &TrackGraph,
    branch: NodeIdx,
    train: u8,
) -> Option<NodeIdx> {
    let node = graph.node(branch);
    debug_assert_eq!(node.kind, NodeKind::Branch);
    for slot in [DIR_CURVED, DIR_STRAIGHT] {
        let edge = node.edge(slot)?;
        if !can_reserve(graph, edge.dest, train) {
            return Some(edge.dest);
        }
    }
    None
}

fn reserve_node(graph: &mut TrackGraph, index: NodeIdx, train: u8) {
    let twin = graph.reverse_of(index);
    let node = graph.node_mut(index);
    node.reserved_by = Some(train);
    node.reserve_dir = ReserveDir::Direct;
    let node = graph.node_mut(twin);
    node.reserved_by = Some(train);
    node.reserve_dir = ReserveDir::Reverse;
}

fn cancel_reserve(graph: &mut TrackGraph, index: NodeIdx, train: u8) {
    if graph.node(index).reserved_by != Some(train) {
        panic!(
            "train {} unreserving {} which it does not hold",
            train,
            graph.node(index).name
        );
    }
    let twin = graph.reverse_of(index);
    for at in [index, twin] {
        let node = graph.node_mut(at);
        node.reserved_by = None;
        node.reserve_dir = ReserveDir::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{build, canonical_switches, TRACK_A};

    struct Fixture {
        graph: TrackGraph,
        reservations: Reservations,
        switches: [u8; NUM_SWITCHES],
    }

    fn fixture() -> Fixture {
        let graph = build(TRACK_A);
        let reservations = Reservations::new(&graph);
        Fixture {
            reservations,
            switches: canonical_switches(TRACK_A),
            graph,
        }
    }

    fn idx(graph: &TrackGraph, name: &str) -> u16 {
        graph
            .find(name)
            .unwrap_or_else(|| panic!("no node named {}", name)) as u16
    }

    fn holders(graph: &TrackGraph) -> Vec<Option<u8>> {
        graph.iter().map(|n| n.reserved_by).collect()
    }

    #[test]
    fn grant_claims_path_lookahead_and_twins() {
        let mut f = fixture();
        // A reversal-shaped request: drive onto the turnout head-first,
        // back out through its branch side toward C11.
        let path = [
            idx(&f.graph, "MR10"),
            idx(&f.graph, "BR10"),
            idx(&f.graph, "C11"),
        ];
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            58,
            &path,
        );
        assert!(outcome.successful);
        assert!(!outcome.dead_lock_detected);
        // MR10's onward leg (100) plus the straight leg of BR10 (50).
        assert_eq!(outcome.res_dist, 150);
        assert_eq!(outcome.throws.as_slice(), &[(10, b's')]);

        for name in ["MR10", "BR10", "C11", "C12"] {
            let i = idx(&f.graph, name) as usize;
            assert_eq!(f.graph.node(i).reserved_by, Some(58), "{}", name);
        }
        // Look-ahead past C11: MR5 (100), C13 (150), MR12 (250 >= 200).
        for name in ["MR5", "C13", "MR12"] {
            let i = idx(&f.graph, name) as usize;
            assert_eq!(f.graph.node(i).reserved_by, Some(58), "{}", name);
        }
        // And no further.
        let c15 = idx(&f.graph, "C15") as usize;
        assert_eq!(f.graph.node(c15).reserved_by, None);
    }

    #[test]
    fn mirror_invariant_holds_after_grants() {
        let mut f = fixture();
        let path = [idx(&f.graph, "A1"), idx(&f.graph, "A3")];
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            24,
            &path,
        );
        assert!(outcome.successful);
        for index in 0..f.graph.len() {
            let node = f.graph.node(index);
            let twin = f.graph.node(f.graph.reverse_of(index));
            assert_eq!(node.reserved_by, twin.reserved_by);
            match node.reserve_dir {
                ReserveDir::None => {
                    assert_eq!(twin.reserve_dir, ReserveDir::None)
                }
                ReserveDir::Direct => {
                    assert_eq!(twin.reserve_dir, ReserveDir::Reverse)
                }
                ReserveDir::Reverse => {
                    assert_eq!(twin.reserve_dir, ReserveDir::Direct)
                }
            }
        }
    }

    #[test]
    fn contention_fails_and_mutates_nothing() {
        let mut f = fixture();
        let first = [idx(&f.graph, "C11")];
        assert!(f
            .reservations
            .try_reserve(&mut f.graph, &f.switches, 58, &first)
            .successful);

        let snapshot = holders(&f.graph);
        // C13 was claimed by 58's look-ahead; 71 may not have it.
        let second = [idx(&f.graph, "C13"), idx(&f.graph, "MR12")];
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            71,
            &second,
        );
        assert!(!outcome.successful);
        assert!(!outcome.dead_lock_detected);
        assert_eq!(outcome.res_dist, 0);
        assert!(outcome.throws.is_empty());
        assert_eq!(holders(&f.graph), snapshot);
    }

    #[test]
    fn crossing_claims_form_a_detected_two_cycle() {
        let mut f = fixture();
        let c1 = idx(&f.graph, "C1");
        assert!(f
            .reservations
            .try_reserve(&mut f.graph, &f.switches, 1, &[c1])
            .successful);
        let c9 = idx(&f.graph, "C9");
        assert!(f
            .reservations
            .try_reserve(&mut f.graph, &f.switches, 2, &[c9])
            .successful);

        // Train 1 asks for train 2's ground and is refused; its want is
        // on record.
        let c9 = idx(&f.graph, "C9");
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            1,
            &[c9],
        );
        assert!(!outcome.successful);
        assert!(!outcome.dead_lock_detected);

        // Train 2 asks for train 1's ground: the wait-for sets now cross.
        let c1 = idx(&f.graph, "C1");
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            2,
            &[c1],
        );
        assert!(!outcome.successful);
        assert!(outcome.dead_lock_detected);
    }

    #[test]
    fn central_junction_admits_one_train() {
        let mut f = fixture();
        // Train 3 takes one central switch; its claim covers the twin.
        let mr155 = idx(&f.graph, "MR155");
        assert!(f
            .reservations
            .try_reserve(
                &mut f.graph,
                &f.switches,
                3,
                &[mr155]
            )
            .successful);

        let snapshot = holders(&f.graph);
        // Train 4's own legs at BR153 are free, but the junction-wide
        // check sees 155 held and refuses.
        let br153 = idx(&f.graph, "BR153");
        let outcome = f.reservations.try_reserve(
            &mut f.graph,
            &f.switches,
            4,
            &[br153],
        );
        assert!(!outcome.successful);
        assert_eq!(holders(&f.graph), snapshot);
        // The wait-for set records the whole junction.
        let wanted = f.reservations.wanted_nodes(4).unwrap();
        for branch in f.graph.central_branches() {
            assert!(wanted.contains(&(branch as u16)));
        }
    }

    #[test]
    fn release_returns_nodes_to_the_pool() {
        let mut f = fixture();
        let path = [idx(&f.graph, "A1")];
        assert!(f
            .reservations
            .try_reserve(&mut f.graph, &f.switches, 5, &path)
            .successful);
        // try_reserve also claimed the look-ahead; release just the
        // requested node and verify only it is freed.
        f.reservations.unreserve(&mut f.graph, 5, &path);
        let a1 = idx(&f.graph, "A1") as usize;
        assert_eq!(f.graph.node(a1).reserved_by, None);
        assert_eq!(
            f.graph.node(f.graph.reverse_of(a1)).reserved_by,
            None
        );
    }

    #[test]
    #[should_panic(expected = "does not hold")]
    fn releasing_foreign_ground_halts() {
        let mut f = fixture();
        let path = [idx(&f.graph, "A1")];
        assert!(f
            .reservations
            .try_reserve(&mut f.graph, &f.switches, 5, &path)
            .successful);
        f.reservations.unreserve(&mut f.graph, 6, &path);
    }
}
