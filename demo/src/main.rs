// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted demo: boots the full task set on the simulated board and runs a
//! scripted dispatch session -- topology init, a path query, contended
//! reservations, a release, a random destination. A host thread stands in
//! for the train controller box on UART channel 1, answering sensor dump
//! queries and collecting command bytes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use abi::priority;
use clap::Parser;
use kern::{BoardConfig, Kernel, Sys};
use task_track::server::api as track_api;
use userlib::{create, kprintln};

#[derive(Parser)]
#[command(about = "model-railway kernel demo on the simulated board")]
struct Args {
    /// Topology to load: a or b.
    #[arg(long, default_value = "a")]
    track: char,
    /// Stop the virtual clock after this many ticks.
    #[arg(long, default_value_t = 3000)]
    ticks: u64,
    /// Pace virtual time against the wall clock (10 ms per tick).
    #[arg(long)]
    realtime: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let track = match args.track {
        'a' | 'A' => track_api::TRACK_A,
        'b' | 'B' => track_api::TRACK_B,
        other => {
            eprintln!("no such track: {}", other);
            std::process::exit(2);
        }
    };

    let cfg = BoardConfig {
        tick_limit: Some(args.ticks),
        tick_ms: args.realtime.then_some(10),
    };
    let (mut kernel, handle) = Kernel::new(cfg);

    let uart0 = kernel.uart0();
    let uart1 = kernel.uart1();
    kernel.add_task(priority::SUPERVISOR, move |sys| {
        root_task(sys, track, uart0, uart1)
    });

    // Host-side stand-in for the train controller box.
    let stop = Arc::new(AtomicBool::new(false));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let controller = {
        let handle = handle.clone();
        let stop = Arc::clone(&stop);
        let commands = Arc::clone(&commands);
        std::thread::spawn(move || {
            let mut sensors = [0u8; 10];
            let mut trip = 0usize;
            while !stop.load(Ordering::Relaxed) {
                for byte in handle.uart1.take_output() {
                    if byte == 0x85 {
                        // Wander a train across the sensors between dumps.
                        sensors = [0; 10];
                        sensors[trip / 8] = 1 << (trip % 8);
                        trip = (trip + 1) % 80;
                        handle.uart1.feed(&sensors);
                    } else {
                        commands.lock().unwrap().push(byte);
                    }
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        })
    };

    let report = kernel.run();
    stop.store(true, Ordering::Relaxed);
    controller.join().unwrap();

    print!("{}", report.console);
    let terminal = handle.uart0.take_output();
    if !terminal.is_empty() {
        println!("--- terminal (uart0) ---");
        print!("{}", String::from_utf8_lossy(&terminal));
    }
    let commands = commands.lock().unwrap();
    println!("--- controller (uart1) ---");
    println!(
        "{} command bytes: {:02x?}",
        commands.len(),
        &commands[..commands.len().min(32)]
    );
    println!("--- kernel ---");
    println!(
        "{} dispatches, {} tasks, {} ticks, idle {}%",
        report.stats.dispatches,
        report.stats.tasks_created,
        report.now,
        report.stats.idle_percent(report.now).unwrap_or(0),
    );
}

/// First user task: brings up the standard servers, then runs the
/// dispatch script.
fn root_task(sys: Sys, track: u8, uart0: kern::board::Uart, uart1: kern::board::Uart) {
    create(&sys, priority::SERVER, task_names::name_server).unwrap();
    create(&sys, priority::SERVER_HIGH, task_clock::clock_server).unwrap();
    task_uart::start_channel(&sys, 0, uart0);
    task_uart::start_channel(&sys, 1, uart1);
    create(&sys, priority::SERVER, task_train::train_admin).unwrap();
    create(&sys, priority::SERVER, task_sensor::sensor_admin).unwrap();
    create(&sys, priority::SERVER, task_track::server::track_server).unwrap();

    let term = task_names::resolve(&sys, task_uart::api::tx_name(0));
    let track_server = task_names::resolve(&sys, track_api::TRACK_SERVER_NAME);

    // Names for the operator's benefit; the server keeps its own copy.
    let map = task_track::data::build(track);

    task_uart::api::puts(&sys, term, b"dispatch session start\r\n");
    track_api::init(&sys, track_server, track);

    let a1 = map.find("A1").unwrap() as u16;
    let c13 = map.find("C13").unwrap() as u16;
    match track_api::get_path(&sys, track_server, a1, c13, true, &[]) {
        Some(route) => {
            kprintln!(&sys, "route A1 -> C13, {} mm:", route.dist);
            for &step in &route.nodes {
                let node = map.node(usize::from(step));
                kprintln!(&sys, "  {}", node.name.as_str());
            }

            let claim = track_api::try_reserve(
                &sys,
                track_server,
                58,
                &route.nodes,
            );
            kprintln!(
                &sys,
                "train 58 claim: ok={} dist={}",
                claim.successful,
                claim.res_dist
            );

            // Train 71 wants the corridor too; the authority refuses.
            let contested =
                track_api::try_reserve(&sys, track_server, 71, &route.nodes);
            kprintln!(
                &sys,
                "train 71 claim: ok={} deadlock={}",
                contested.successful,
                contested.dead_lock_detected
            );

            track_api::unreserve(&sys, track_server, 58, &route.nodes);
            kprintln!(&sys, "train 58 released its claim");

            // 58's safety overhang past C13 is still standing, so 71
            // takes the now-free head of the corridor instead.
            let retry = track_api::try_reserve(
                &sys,
                track_server,
                71,
                &route.nodes[..3],
            );
            kprintln!(&sys, "train 71 retry: ok={}", retry.successful);
        }
        None => kprintln!(&sys, "no route A1 -> C13"),
    }

    if let Some(dest) = track_api::random_dest(&sys, track_server, a1) {
        let node = map.node(usize::from(dest));
        kprintln!(&sys, "wander target from A1: {}", node.name.as_str());
    }

    task_uart::api::puts(&sys, term, b"dispatch session done\r\n");
}
