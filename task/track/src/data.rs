// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two installation topologies.
//!
//! Both are laid out around the same skeleton: an outer oval (A sensors),
//! an inner oval (C sensors), two one-per-direction corridors between them
//! (B sensors) crossing at the central junction (switches 153-156), plus
//! sidings (D sensors) and one stub track at the edge (EN1/EX1). Track B
//! omits the sidings and stretches the plain segments.
//!
//! Only forward links are written down; the builder mirrors each one, so
//! the opposite running direction exists by construction.

use crate::graph::{NodeIdx, TrackGraph, DIR_AHEAD, DIR_CURVED, DIR_STRAIGHT};

/// Identifies a topology on the wire.
pub const TRACK_A: u8 = b'a';
pub const TRACK_B: u8 = b'b';

/// Switch slots: ids 1..=18 map to slots 0..=17, ids 153..=156 to
/// slots 18..=21.
pub const NUM_SWITCHES: usize = 22;

pub fn switch_slot(id: u8) -> usize {
    match id {
        1..=18 => usize::from(id) - 1,
        153..=156 => usize::from(id) - 153 + 18,
        _ => panic!("no such switch: {}", id),
    }
}

pub fn switch_id(slot: usize) -> u8 {
    match slot {
        0..=17 => slot as u8 + 1,
        18..=21 => (slot - 18) as u8 + 153,
        _ => panic!("no such switch slot: {}", slot),
    }
}

/// The central switches pair across the diamond: each must hold the
/// complement of its partner's position.
pub fn central_partner(id: u8) -> Option<u8> {
    match id {
        153 => Some(154),
        154 => Some(153),
        155 => Some(156),
        156 => Some(155),
        _ => None,
    }
}

/// Canonical starting pattern for a topology, by switch slot.
pub fn canonical_switches(track: u8) -> [u8; NUM_SWITCHES] {
    match track {
        TRACK_A => {
            let mut pattern = [b'c'; NUM_SWITCHES];
            pattern[switch_slot(153)] = b's';
            pattern[switch_slot(155)] = b's';
            pattern
        }
        TRACK_B => {
            let mut pattern = [b's'; NUM_SWITCHES];
            pattern[switch_slot(5)] = b'c';
            pattern[switch_slot(7)] = b'c';
            pattern[switch_slot(153)] = b'c';
            pattern[switch_slot(155)] = b'c';
            pattern
        }
        _ => panic!("no such track: {}", track),
    }
}

struct Layout {
    /// Length of a plain sensor-to-sensor segment.
    plain: u32,
    /// Length of a switch leg.
    leg: u32,
    /// Length of the crossing diagonals in the central junction.
    diagonal: u32,
    /// Whether the sidings (switches 3, 10, 12 and the D sensors) exist.
    sidings: bool,
}

pub fn build(track: u8) -> TrackGraph {
    let layout = match track {
        TRACK_A => Layout {
            plain: 100,
            leg: 50,
            diagonal: 70,
            sidings: true,
        },
        TRACK_B => Layout {
            plain: 120,
            leg: 60,
            diagonal: 80,
            sidings: false,
        },
        _ => panic!("no such track: {}", track),
    };
    build_layout(&layout)
}

fn build_layout(layout: &Layout) -> TrackGraph {
    let mut g = TrackGraph::new();
    let plain = layout.plain;
    let leg = layout.leg;

    // Sensor pairs; the forward node is the odd name.
    let mut sensor = |g: &mut TrackGraph, n: u8| -> NodeIdx {
        let mut fwd = heapless::String::<8>::new();
        let mut rev = heapless::String::<8>::new();
        let letter = [b'A', b'B', b'C', b'D'][usize::from((n - 1) / 16)];
        let local = (n - 1) % 16 + 1;
        core::fmt::Write::write_fmt(
            &mut fwd,
            format_args!("{}{}", letter as char, local),
        )
        .unwrap();
        core::fmt::Write::write_fmt(
            &mut rev,
            format_args!("{}{}", letter as char, local + 1),
        )
        .unwrap();
        g.add_sensor_pair(&fwd, &rev, n).0
    };

    // Outer oval.
    let a1 = sensor(&mut g, 1);
    let a3 = sensor(&mut g, 3);
    let a5 = sensor(&mut g, 5);
    let a7 = sensor(&mut g, 7);
    let a9 = sensor(&mut g, 9);
    let a11 = sensor(&mut g, 11);
    let a13 = sensor(&mut g, 13);
    let a15 = sensor(&mut g, 15);
    // Corridors.
    let b1 = sensor(&mut g, 17);
    let b3 = sensor(&mut g, 19);
    let b5 = sensor(&mut g, 21);
    let b7 = sensor(&mut g, 23);
    // Inner oval.
    let c1 = sensor(&mut g, 33);
    let c3 = sensor(&mut g, 35);
    let c5 = sensor(&mut g, 37);
    let c7 = sensor(&mut g, 39);
    let c9 = sensor(&mut g, 41);
    let c11 = sensor(&mut g, 43);
    let c13 = sensor(&mut g, 45);
    let c15 = sensor(&mut g, 47);

    let (br1, _mr1) = g.add_switch(1);
    let (_br4, mr4) = g.add_switch(4);
    let (_br5, mr5) = g.add_switch(5);
    let (br8, _mr8) = g.add_switch(8);
    let (_br9, mr9) = g.add_switch(9);
    let (br153, _mr153) = g.add_switch(153);
    let (_br154, mr154) = g.add_switch(154);
    let (br155, _mr155) = g.add_switch(155);
    let (_br156, mr156) = g.add_switch(156);

    let (en1, _ex1) = g.add_endpoint("EN1", "EX1");

    // Outer oval, clockwise.
    g.link(a1, DIR_AHEAD, a3, DIR_AHEAD, plain);
    g.link(a3, DIR_AHEAD, br1, DIR_AHEAD, plain);
    g.link(br1, DIR_STRAIGHT, a5, DIR_AHEAD, leg);
    g.link(br1, DIR_CURVED, b1, DIR_AHEAD, leg);
    g.link(a9, DIR_AHEAD, a11, DIR_AHEAD, plain);
    g.link(a11, DIR_AHEAD, mr4, DIR_STRAIGHT, plain);
    g.link(mr4, DIR_AHEAD, a13, DIR_AHEAD, leg);
    g.link(a13, DIR_AHEAD, a15, DIR_AHEAD, plain);
    g.link(a15, DIR_AHEAD, a1, DIR_AHEAD, plain);

    // Outbound corridor with the central diamond.
    g.link(b1, DIR_AHEAD, br153, DIR_AHEAD, plain);
    g.link(br153, DIR_STRAIGHT, mr154, DIR_STRAIGHT, leg);
    g.link(br153, DIR_CURVED, mr156, DIR_CURVED, layout.diagonal);
    g.link(mr154, DIR_AHEAD, b3, DIR_AHEAD, leg);
    g.link(b3, DIR_AHEAD, mr5, DIR_CURVED, plain);

    // Return corridor, crossing the first.
    g.link(b5, DIR_AHEAD, br155, DIR_AHEAD, plain);
    g.link(br155, DIR_STRAIGHT, mr156, DIR_STRAIGHT, leg);
    g.link(br155, DIR_CURVED, mr154, DIR_CURVED, layout.diagonal);
    g.link(mr156, DIR_AHEAD, b7, DIR_AHEAD, leg);
    g.link(b7, DIR_AHEAD, mr4, DIR_CURVED, plain);

    // Inner oval.
    g.link(c1, DIR_AHEAD, c3, DIR_AHEAD, plain);
    g.link(c3, DIR_AHEAD, c5, DIR_AHEAD, plain);
    g.link(c5, DIR_AHEAD, c7, DIR_AHEAD, plain);
    g.link(c7, DIR_AHEAD, br8, DIR_AHEAD, plain);
    g.link(br8, DIR_STRAIGHT, c9, DIR_AHEAD, leg);
    g.link(br8, DIR_CURVED, b5, DIR_AHEAD, leg);
    g.link(c11, DIR_AHEAD, mr5, DIR_STRAIGHT, plain);
    g.link(mr5, DIR_AHEAD, c13, DIR_AHEAD, leg);
    g.link(c15, DIR_AHEAD, mr9, DIR_STRAIGHT, plain);
    g.link(mr9, DIR_AHEAD, c1, DIR_AHEAD, leg);

    // Stub track feeding the inner oval.
    g.link(en1, DIR_AHEAD, mr9, DIR_CURVED, plain);

    if layout.sidings {
        // Loop off the outer oval: out at switch 3, back in at switch 2.
        let d1 = sensor(&mut g, 49);
        let d3 = sensor(&mut g, 51);
        let (_br2, mr2) = g.add_switch(2);
        let (br3, _mr3) = g.add_switch(3);
        g.link(a5, DIR_AHEAD, mr2, DIR_STRAIGHT, plain);
        g.link(mr2, DIR_AHEAD, a7, DIR_AHEAD, leg);
        g.link(a7, DIR_AHEAD, br3, DIR_AHEAD, plain);
        g.link(br3, DIR_STRAIGHT, a9, DIR_AHEAD, leg);
        g.link(br3, DIR_CURVED, d1, DIR_AHEAD, leg);
        g.link(d1, DIR_AHEAD, d3, DIR_AHEAD, plain);
        g.link(d3, DIR_AHEAD, mr2, DIR_CURVED, plain);

        // Inner-oval siding bypassing C11/C13.
        let d5 = sensor(&mut g, 53);
        let d7 = sensor(&mut g, 55);
        let (br10, _mr10) = g.add_switch(10);
        let (_br12, mr12) = g.add_switch(12);
        g.link(c9, DIR_AHEAD, br10, DIR_AHEAD, plain);
        g.link(br10, DIR_STRAIGHT, c11, DIR_AHEAD, leg);
        g.link(br10, DIR_CURVED, d5, DIR_AHEAD, leg);
        g.link(d5, DIR_AHEAD, d7, DIR_AHEAD, plain);
        g.link(d7, DIR_AHEAD, mr12, DIR_CURVED, plain);
        g.link(c13, DIR_AHEAD, mr12, DIR_STRAIGHT, plain);
        g.link(mr12, DIR_AHEAD, c15, DIR_AHEAD, leg);
    } else {
        g.link(a5, DIR_AHEAD, a7, DIR_AHEAD, plain);
        g.link(a7, DIR_AHEAD, a9, DIR_AHEAD, plain);
        g.link(c9, DIR_AHEAD, c11, DIR_AHEAD, plain);
        g.link(c13, DIR_AHEAD, c15, DIR_AHEAD, plain);
    }

    g.check();
    g
}
