// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shortest paths over the track graph.
//!
//! Plain Dijkstra on edge distance, run forward from the source and, for
//! the reversal variant, backward from the destination over transposed
//! edges. The graph tops out at [`TRACK_MAX`] nodes, so the quadratic scan
//! for the frontier minimum is fine.

use crate::graph::{NodeIdx, NodeKind, TrackGraph, TRACK_MAX};
use crate::rng::TrackRng;

/// Longest path the authority will hand out, in nodes.
pub const MAX_PATH: usize = 64;

pub const INFINITE: u32 = u32::MAX;

/// A banned-node mask. (Index-set capacities must be powers of two.)
pub type BanSet = heapless::FnvIndexSet<u16, 256>;

/// A computed route.
#[derive(Clone, Debug, Default)]
pub struct Route {
    pub nodes: heapless::Vec<u16, MAX_PATH>,
    pub dist: u32,
    /// If the route changes direction once: the node driven to head-first,
    /// and the distance from the source at which the reversal happens.
    /// The node after it in `nodes` is its reverse twin.
    pub reverse_at: Option<(u16, u32)>,
}

struct Search {
    dist: [u32; TRACK_MAX],
    prev: [Option<u16>; TRACK_MAX],
}

impl Search {
    fn run(
        graph: &TrackGraph,
        origin: NodeIdx,
        banned: Option<&BanSet>,
        transposed: bool,
    ) -> Self {
        let mut dist = [INFINITE; TRACK_MAX];
        let mut prev = [None; TRACK_MAX];
        let mut done = [false; TRACK_MAX];
        dist[origin] = 0;

        loop {
            let mut at = None;
            let mut best = INFINITE;
            for index in 0..graph.len() {
                if !done[index] && dist[index] < best {
                    best = dist[index];
                    at = Some(index);
                }
            }
            let Some(at) = at else { break };
            done[at] = true;

            for (from, edge) in edges_from(graph, at, transposed) {
                let to = if transposed { from } else { edge.dest };
                if let Some(banned) = banned {
                    if banned.contains(&(to as u16)) {
                        continue;
                    }
                }
                let candidate = dist[at].saturating_add(edge.dist);
                if candidate < dist[to] {
                    dist[to] = candidate;
                    prev[to] = Some(at as u16);
                }
            }
        }
        Self { dist, prev }
    }

    /// Walks the predecessor chain from `origin` out to `node`.
    fn chain_to(&self, node: NodeIdx) -> Option<heapless::Vec<u16, MAX_PATH>> {
        let mut reversed = heapless::Vec::<u16, MAX_PATH>::new();
        let mut at = node as u16;
        loop {
            reversed.push(at).ok()?;
            match self.prev[usize::from(at)] {
                Some(parent) => at = parent,
                None => break,
            }
        }
        let mut path = heapless::Vec::new();
        for &step in reversed.iter().rev() {
            path.push(step).ok()?;
        }
        Some(path)
    }
}

/// Iterates a node's outgoing edges, or with `transposed` the edges that
/// arrive at it (yielded as `(their_source, edge)`).
fn edges_from(
    graph: &TrackGraph,
    node: NodeIdx,
    transposed: bool,
) -> heapless::Vec<(NodeIdx, crate::graph::Edge), 8> {
    let mut out = heapless::Vec::new();
    if transposed {
        for index in 0..graph.len() {
            for edge in graph.node(index).edges.iter().flatten() {
                if edge.dest == node {
                    let _ = out.push((index, *edge));
                }
            }
        }
    } else {
        for edge in graph.node(node).edges.iter().flatten() {
            let _ = out.push((node, *edge));
        }
    }
    out
}

/// The unique shortest directed path, or `None` when the destination is
/// unreachable.
pub fn path(graph: &TrackGraph, src: NodeIdx, dst: NodeIdx) -> Option<Route> {
    let search = Search::run(graph, src, None, false);
    if search.dist[dst] == INFINITE {
        return None;
    }
    Some(Route {
        nodes: search.chain_to(dst)?,
        dist: search.dist[dst],
        reverse_at: None,
    })
}

/// Shortest path avoiding `banned`, optionally allowing one mid-path
/// reversal: for every node `m`, a candidate route runs shortest to `m`,
/// flips to `m`'s twin, and runs shortest from there to `dst`. The best
/// candidate wins; ties go to not reversing.
pub fn path_with_ban(
    graph: &TrackGraph,
    src: NodeIdx,
    dst: NodeIdx,
    banned: &BanSet,
    allow_reverse: bool,
) -> Option<Route> {
    let forward = Search::run(graph, src, Some(banned), false);
    let mut best = forward.dist[dst];
    let mut reverse_at: Option<NodeIdx> = None;

    let to_dst = if allow_reverse {
        let to_dst = Search::run(graph, dst, Some(banned), true);
        for m in 0..graph.len() {
            if forward.dist[m] == INFINITE {
                continue;
            }
            let twin = graph.reverse_of(m);
            if to_dst.dist[twin] == INFINITE {
                continue;
            }
            let candidate =
                forward.dist[m].saturating_add(to_dst.dist[twin]);
            if candidate < best {
                best = candidate;
                reverse_at = Some(m);
            }
        }
        Some(to_dst)
    } else {
        None
    };

    if best == INFINITE {
        return None;
    }

    match reverse_at {
        None => Some(Route {
            nodes: forward.chain_to(dst)?,
            dist: best,
            reverse_at: None,
        }),
        Some(m) => {
            let to_dst = to_dst.as_ref().unwrap();
            let mut nodes = forward.chain_to(m)?;
            // Suffix: twin's chain toward dst comes from the transposed
            // search, whose prev pointers are next-hops toward dst.
            let mut at = graph.reverse_of(m) as u16;
            loop {
                nodes.push(at).ok()?;
                match to_dst.prev[usize::from(at)] {
                    Some(next) => at = next,
                    None => break,
                }
            }
            Some(Route {
                dist: best,
                reverse_at: Some((m as u16, forward.dist[m])),
                nodes,
            })
        }
    }
}

/// Picks a random sensor reachable from `src`, for the self-driving mode.
pub fn random_sensor_dest(
    graph: &TrackGraph,
    src: NodeIdx,
    rng: &mut TrackRng,
) -> Option<NodeIdx> {
    let search = Search::run(graph, src, None, false);
    let mut reachable = heapless::Vec::<u16, TRACK_MAX>::new();
    for index in 0..graph.len() {
        if index != src
            && search.dist[index] != INFINITE
            && graph.node(index).kind == NodeKind::Sensor
        {
            let _ = reachable.push(index as u16);
        }
    }
    if reachable.is_empty() {
        return None;
    }
    Some(usize::from(reachable[rng.pick(reachable.len())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{build, TRACK_A};

    fn idx(graph: &TrackGraph, name: &str) -> NodeIdx {
        graph
            .find(name)
            .unwrap_or_else(|| panic!("no node named {}", name))
    }

    fn names(graph: &TrackGraph, route: &Route) -> Vec<String> {
        route
            .nodes
            .iter()
            .map(|&n| graph.node(usize::from(n)).name.as_str().to_string())
            .collect()
    }

    #[test]
    fn shortest_path_across_the_corridor() {
        // Hand check: A1 -100- A3 -100- BR1 -50- B1 -100- BR153 -50-
        // MR154 -50- B3 -100- MR5 -50- C13.
        let g = build(TRACK_A);
        let route = path(&g, idx(&g, "A1"), idx(&g, "C13")).unwrap();
        assert_eq!(
            names(&g, &route),
            ["A1", "A3", "BR1", "B1", "BR153", "MR154", "B3", "MR5", "C13"]
        );
        assert_eq!(route.dist, 600);
        assert!(route.reverse_at.is_none());
    }

    #[test]
    fn path_to_unreachable_node_fails() {
        // EN1 has no incoming edges; nothing reaches an entry node.
        let g = build(TRACK_A);
        assert!(path(&g, idx(&g, "A1"), idx(&g, "EN1")).is_none());
    }

    #[test]
    fn siding_wins_as_a_bypass() {
        // C9 to C15: the D siding (400) beats the C11/C13 stretch (450).
        let g = build(TRACK_A);
        let route = path(&g, idx(&g, "C9"), idx(&g, "C15")).unwrap();
        let route_names = names(&g, &route);
        assert!(route_names.contains(&"D5".to_string()));
        assert_eq!(route.dist, 400);
    }

    #[test]
    fn ban_reroutes_through_the_crossing() {
        // C13's only approaches are C11 and the corridor into MR5. Ban
        // C11 and the route from C1 must cross the central junction.
        let g = build(TRACK_A);
        let mut banned = BanSet::new();
        banned.insert(idx(&g, "C11") as u16).unwrap();
        let route =
            path_with_ban(&g, idx(&g, "C1"), idx(&g, "C13"), &banned, false)
                .unwrap();
        let route_names = names(&g, &route);
        assert!(route_names.contains(&"BR155".to_string()));
        assert!(route_names.contains(&"B3".to_string()));
        assert!(!route_names.contains(&"C11".to_string()));
        assert_eq!(route.dist, 820);
    }

    #[test]
    fn reversal_reaches_nodes_behind_the_source() {
        // A3's twin A4 is reachable head-first only by driving somewhere
        // that allows turning back; with a single reversal the route flips
        // at some node m to m's twin.
        let g = build(TRACK_A);
        let src = idx(&g, "A1");
        let dst = idx(&g, "A4");
        let banned = BanSet::new();
        assert!(path_with_ban(&g, src, dst, &banned, false).is_none());
        let route = path_with_ban(&g, src, dst, &banned, true).unwrap();
        let (m, offset) = route.reverse_at.expect("route must reverse");
        let m = usize::from(m);
        // The reversal point appears in the route followed by its twin.
        let pos = route
            .nodes
            .iter()
            .position(|&n| usize::from(n) == m)
            .unwrap();
        assert_eq!(
            usize::from(route.nodes[pos + 1]),
            g.reverse_of(m),
            "reversal must continue from the twin"
        );
        assert!(offset <= route.dist);
        assert_eq!(usize::from(*route.nodes.last().unwrap()), dst);
    }

    #[test]
    fn random_dest_is_a_reachable_sensor() {
        let g = build(TRACK_A);
        let mut rng = TrackRng::new(7);
        for _ in 0..20 {
            let dest =
                random_sensor_dest(&g, idx(&g, "A1"), &mut rng).unwrap();
            assert_eq!(g.node(dest).kind, NodeKind::Sensor);
            assert!(path(&g, idx(&g, "A1"), dest).is_some());
        }
    }
}
