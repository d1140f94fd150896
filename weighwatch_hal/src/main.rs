//! # Weighwatch Station Binary
//!
//! Tares the load cell, then watches for the expected weight. A check that
//! times out plays the alert melody until the weight arrives or the process
//! is stopped.
//!
//! # Usage
//!
//! ```bash
//! # Raspberry Pi (built with --features hardware)
//! weighwatch --config /etc/weighwatch/station.toml
//!
//! # Force the simulation backend
//! weighwatch --simulate -v
//!
//! # Print the pin table after setup and exit
//! weighwatch --simulate --status
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use weighwatch_common::config::{LogLevel, StationConfig};
use weighwatch_common::consts::DEFAULT_CONFIG_PATH;
use weighwatch_hal::backend::{BackendRegistry, GpioBackend};
use weighwatch_hal::{PinRegistry, WeightMonitor};

/// Weighwatch - load-cell weight check with buzzer and LED alerts
#[derive(Parser, Debug)]
#[command(name = "weighwatch")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Load-cell weight check with buzzer and LED alerts")]
#[command(long_about = None)]
struct Args {
    /// Path to station configuration file (station.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force the simulation backend
    #[arg(short = 's', long)]
    simulate: bool,

    /// GPIO backend to use (overrides the config file)
    #[arg(short, long)]
    backend: Option<String>,

    /// Calibration record path (overrides the config file)
    #[arg(long, value_name = "FILE")]
    calibration: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Print the pin ownership table after setup and exit
    #[arg(long)]
    status: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("weighwatch failed: {}", e);
        eprintln!("weighwatch: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = StationConfig::load_or_default(&args.config);
    let log_level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    let mut config = loaded?;
    if let Some(path) = &args.calibration {
        config.scale.calibration_file = path.clone();
    }

    if args.dump_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Weighwatch v{} starting...", env!("CARGO_PKG_VERSION"));

    let backend = open_backend(&args, &config)?;
    let registry = Arc::new(PinRegistry::new(backend));

    if detect_rt_mode() {
        info!("Running with a real-time scheduling policy");
    } else {
        info!("Running in standard (non-RT) mode; tone timing is best effort");
    }

    let mut monitor = WeightMonitor::setup(config, Arc::clone(&registry))?;

    if args.status {
        println!("{}", serde_json::to_string_pretty(&registry.status())?);
        monitor.shutdown()?;
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    monitor.tare();
    monitor.run(&running);
    monitor.shutdown()?;

    info!("Weighwatch shutdown complete");
    Ok(())
}

/// Create the requested backend, falling back to simulation when the
/// hardware is absent.
fn open_backend(
    args: &Args,
    config: &StationConfig,
) -> Result<Arc<dyn GpioBackend>, Box<dyn std::error::Error>> {
    let backends = BackendRegistry::with_builtin();
    let name = if args.simulate {
        info!("Simulation mode enabled (exclusive)");
        "simulation"
    } else {
        args.backend.as_deref().unwrap_or(&config.gpio.backend)
    };

    match backends.create(name) {
        Ok(backend) => {
            info!("Using {} GPIO backend", backend.name());
            Ok(backend)
        }
        Err(e) if name != "simulation" => {
            warn!("GPIO backend '{}' unavailable ({}), falling back to simulation", name, e);
            Ok(backends.create("simulation")?)
        }
        Err(e) => Err(e.into()),
    }
}

fn to_tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        to_tracing_level(configured)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Detect if running under a real-time scheduling policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{sched_getscheduler, SCHED_FIFO, SCHED_RR};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
