// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Track authority: the static track graph, shortest-path routing, and
//! the reservation server that arbitrates exclusive claims between
//! trains.
//!
//! The pure machinery (graph, routing, reservations) is separated from
//! the server task so it can be exercised directly; the server in
//! [`server`] is a thin request loop over it.

pub mod data;
pub mod graph;
pub mod reserve;
pub mod rng;
pub mod route;
pub mod server;
