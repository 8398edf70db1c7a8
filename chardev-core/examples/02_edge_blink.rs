//! Edge Blink Example
//!
//! Runs the blink unit on the simulated board. Each press of the switch
//! line schedules one toggle run of the LED on the worker thread; presses
//! during a run are folded into at most one follow-up run.
//!
//! ## Running the Example
//!
//! ```bash
//! RUST_LOG=debug cargo run --example 02_edge_blink
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chardev_core::sim::SimGpio;
use chardev_core::{BlinkConfig, BlinkDevice, ToggleSequence};
use fugit::MillisDurationU32;

fn main() {
    env_logger::init();

    println!("chardev Edge Blink Example");
    println!("==========================\n");

    let chip = Arc::new(SimGpio::board());
    let config = BlinkConfig {
        sequence: ToggleSequence::new(10, MillisDurationU32::millis(20)),
        ..BlinkConfig::default()
    };
    let switch = config.switch_line;
    let led = config.led_line;

    let mut dev = BlinkDevice::new(Arc::clone(&chip), config);
    if let Err(e) = dev.init() {
        eprintln!("init failed: {} ({})", e, e.code());
        return;
    }
    println!("LED line {} starts {}", led, if chip.level(led) { "high" } else { "low" });

    for press in 0..3 {
        if chip.drive(switch, true) {
            println!("press {}: handler returned {:?}", press, dev.on_edge());
        }
        chip.drive(switch, false);
        thread::sleep(Duration::from_millis(30));
    }

    let edges = dev.edges();

    // Teardown joins the worker, so any queued run completes first
    dev.teardown();

    let stats = dev.task().stats();
    println!("edges handled : {}", edges);
    println!("runs          : {}", stats.runs.load(Ordering::Relaxed));
    println!("coalesced     : {}", stats.coalesced.load(Ordering::Relaxed));
    println!("flips         : {}", chip.writes(led));
    println!("resource log  : {:?}", chip.journal());
}
