//! FIFO Transfer Example
//!
//! Walks through the byte-stream contract of the FIFO unit: a write that
//! does not fit, a partial read, and the three control requests.
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_fifo_transfer
//! ```

use chardev_core::{ControlRequest, ControlResponse, ControlTarget, FifoDevice};

fn main() {
    println!("chardev FIFO Transfer Example");
    println!("=============================\n");

    let mut fifo = FifoDevice::default();
    if let Err(e) = fifo.init() {
        eprintln!("init failed: {} ({})", e, e.code());
        return;
    }

    let data: Vec<u8> = (b'A'..=b'Z').chain(b'a'..=b'n').collect();
    let accepted = fifo.write(&data).unwrap_or(0);
    println!("wrote {} of {} bytes", accepted, data.len());

    let mut out = [0u8; 10];
    let got = fifo.read(&mut out).unwrap_or(0);
    println!("read {} bytes: {}", got, String::from_utf8_lossy(&out[..got]));

    for request in [ControlRequest::QueryInfo, ControlRequest::Resize(1024), ControlRequest::QueryInfo] {
        match fifo.control(request) {
            Ok(ControlResponse::Info(info)) => println!(
                "info: size={}, filled={}, empty={}",
                info.capacity, info.length, info.available
            ),
            Ok(ControlResponse::Resized { capacity }) => println!("resized to {}", capacity),
            Ok(ControlResponse::Cleared) => println!("cleared"),
            Err(e) => println!("{:?} failed: {} ({})", request, e, e.code()),
        }
    }

    // Shrinking below the fill level is refused
    if let Err(e) = fifo.control(ControlRequest::Resize(4)) {
        println!("resize to 4 refused: {}", e);
    }

    let mut rest = Vec::new();
    let mut buf = [0u8; 8];
    while let Ok(n @ 1..) = fifo.read(&mut buf) {
        rest.extend_from_slice(&buf[..n]);
    }
    println!("drained: {}", String::from_utf8_lossy(&rest));

    fifo.teardown();
}
