//! Flood Prediction Service - Main Daemon
//!
//! A long-running service that continuously:
//! 1. Reads flow sensor frames from the board on the serial link
//! 2. Predicts each monitored site's water level with the pre-trained model
//! 3. Mirrors readings and predictions to the Firebase Realtime Database
//! 4. Optionally serves the prediction form over HTTP
//!
//! Usage:
//!   cargo run --release                        # Poll loop only
//!   cargo run --release -- --endpoint 5000     # Poll loop + web front door on port 5000
//!   cargo run --release -- --web-only          # Web front door only (no board needed)
//!   cargo run --release -- --read-once         # Read and print a single sensor frame
//!   cargo run --release -- --config other.toml # Alternate configuration file
//!
//! Environment:
//!   FLOODCAST_CONFIG      - configuration file path (default: floodcast.toml)
//!   FLOODCAST_SERIAL_PORT - serial port override
//!   FLOODCAST_MODEL_PATH  - model artifact override
//!   FIREBASE_CREDENTIALS  - credential file override
//!   FIREBASE_DATABASE_URL - database URL override

use floodcast::config::{self, Config};
use floodcast::logging::{self, Component};
use floodcast::model::FloodError;
use floodcast::oracle::{Predictor, RegressionModel};
use floodcast::poll::{PollLoop, StopSignal};
use floodcast::serial::{self, SerialReader};
use floodcast::sync::FirebaseClient;
use floodcast::web::{self, FrontDoor};
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct Args {
    config: Option<String>,
    endpoint_port: Option<u16>,
    web_only: bool,
    read_once: bool,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--config PATH] [--endpoint PORT] [--web-only] [--read-once]",
        program
    )
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        config: None,
        endpoint_port: None,
        web_only: false,
        read_once: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    parsed.config = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
            }
            "--endpoint" => {
                match args.get(i + 1).and_then(|p| p.parse().ok()) {
                    Some(port) => parsed.endpoint_port = Some(port),
                    None => {
                        eprintln!("Error: --endpoint requires a port number");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            "--web-only" => {
                parsed.web_only = true;
                i += 1;
            }
            "--read-once" => {
                parsed.read_once = true;
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("{}", usage(&args[0]));
                std::process::exit(1);
            }
        }
    }

    parsed
}

/// Loads the configured model, plus the web form's own artifact if it has one.
fn load_models(config: &Config) -> Result<(Arc<dyn Predictor>, Arc<dyn Predictor>), FloodError> {
    let primary: Arc<dyn Predictor> = Arc::new(RegressionModel::load(Path::new(&config.model.path))?);

    let web = match &config.web.model {
        Some(path) if *path != config.model.path => {
            Arc::new(RegressionModel::load(Path::new(path))?) as Arc<dyn Predictor>
        }
        _ => Arc::clone(&primary),
    };

    Ok((primary, web))
}

fn exit_with(context: &str, err: &FloodError) -> ! {
    eprintln!("\n❌ {}: {}\n", context, err);
    std::process::exit(1);
}

fn main() {
    println!("🌊 Flood Prediction Service");
    println!("============================\n");

    let args = parse_args();

    let config_path = config::config_path(args.config.as_deref());
    let config = config::load_config(Path::new(&config_path))
        .unwrap_or_else(|e| exit_with("Configuration failed", &e));
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(
        Component::System,
        &format!("floodcast {} starting with {}", env!("CARGO_PKG_VERSION"), config_path),
    );

    if args.read_once {
        match serial::read_single_frame(&config.serial) {
            Ok(frame) => println!("Sensor Data: {}", frame),
            Err(e) => exit_with("Sensor read failed", &e),
        }
        return;
    }

    println!("🧠 Loading model...");
    let (oracle, web_oracle) = load_models(&config).unwrap_or_else(|e| exit_with("Model load failed", &e));
    println!("✓ Model loaded\n");

    let door = Arc::new(FrontDoor::from_config(&config.web, web_oracle));

    if args.web_only {
        let port = args.endpoint_port.unwrap_or(config.web.port);
        println!("🚀 Starting web front door on port {}...", port);
        if let Err(e) = web::start_front_door(port, door, config.web.workers) {
            exit_with("Web front door failed", &e);
        }
        return;
    }

    // Start HTTP endpoint if requested (in background thread)
    if let Some(port) = args.endpoint_port {
        println!("🚀 Starting web front door...");
        let workers = config.web.workers;
        std::thread::spawn(move || {
            if let Err(e) = web::start_front_door(port, door, workers) {
                logging::log_failure(Component::Web, "Front door", &e);
            }
        });
        println!("   Front door running on http://0.0.0.0:{}\n", port);
    }

    println!("🔐 Connecting to Firebase...");
    let sync = FirebaseClient::connect(&config.sync, &config.sites)
        .unwrap_or_else(|e| exit_with("Firebase initialization failed", &e));
    println!("✓ Writing to {}\n", sync.url());

    let stop = StopSignal::new();
    if let Err(e) = stop.install_ctrlc_handler() {
        exit_with("Signal setup failed", &e);
    }

    let reader = SerialReader::new(&config.serial).with_interrupt(stop.clone());

    println!("🔄 Starting poll loop...");
    println!("   Serial port: {} @ {} baud", config.serial.port, config.serial.baud_rate);
    println!("   Poll interval: {} seconds", config.poll.interval_secs);
    println!("   Monitoring {} sites", config.sites.len());
    println!("   Press Ctrl+C to stop\n");

    let mut poll = PollLoop::new(
        reader,
        oracle,
        sync,
        stop,
        config.sites.clone(),
        Duration::from_secs(config.poll.interval_secs),
    );

    match poll.run() {
        Ok(iterations) => {
            logging::info(Component::System, &format!("Shutdown after {} iterations", iterations));
            println!("\n✓ Stopped after {} iterations", iterations);
        }
        Err(e) => {
            logging::log_failure(Component::System, "Poll loop", &e);
            exit_with("Poll loop stopped", &e);
        }
    }
}
