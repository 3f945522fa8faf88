#!/usr/bin/env rust
//! Sensor Link Check
//!
//! Opens the configured serial port, prints a few parsed sensor frames and
//! closes the port. Useful when wiring up a new board before starting the
//! full service.
//!
//! Usage:
//!   cargo run --bin read_sensor                 # one frame
//!   cargo run --bin read_sensor -- 10           # ten frames
//!   cargo run --bin read_sensor -- 10 /dev/ttyACM0
//!
//! Environment:
//!   FLOODCAST_CONFIG      - configuration file path (default: floodcast.toml)
//!   FLOODCAST_SERIAL_PORT - serial port override

use floodcast::config;
use floodcast::serial::SerialReader;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔌 Sensor Link Check");
    println!("====================\n");

    let args: Vec<String> = std::env::args().collect();
    let count: usize = match args.get(1) {
        Some(n) => n.parse().unwrap_or_else(|_| {
            eprintln!("Usage: {} [COUNT] [PORT]", args[0]);
            std::process::exit(1);
        }),
        None => 1,
    };

    let mut config = config::load_config(Path::new(&config::config_path(None)))?;
    if let Some(port) = args.get(2) {
        config.serial.port = port.clone();
    }

    println!("📡 {} @ {} baud", config.serial.port, config.serial.baud_rate);
    let mut reader = SerialReader::new(&config.serial);
    reader.connect()?;
    println!("✓ Connected\n");

    let mut empty = 0;
    for i in 1..=count {
        let frame = reader.read_data()?;
        if frame.is_empty() {
            empty += 1;
        }
        println!("   #{:<3} {} sensor(s): {}", i, frame.len(), frame);
    }

    reader.close();

    println!("\n✓ Read {} frame(s), {} with no usable fields", count, empty);
    Ok(())
}
