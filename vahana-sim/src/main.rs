//! VahanaSim - run a world file in real time
//!
//! ```text
//! vahana-sim worlds/demo.toml
//! vahana-sim worlds/demo.toml -v DEBUG --full-profiler
//! vahana-sim worlds/demo.toml --headless --max-time 10
//! ```
//!
//! In the terminal viewer, type a key and press Enter: `1`..`6` selects a
//! vehicle, `esc` quits, anything else goes to the selected vehicle.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vahana_sim::launch::{self, LaunchOptions};

#[derive(Parser, Debug)]
#[command(name = "vahana-sim", version, about = "Multi-vehicle 2D physics simulator")]
struct Cli {
    /// World description (TOML)
    world_file: PathBuf,

    /// Log level: TRACE, DEBUG, INFO, WARN or ERROR
    #[arg(short = 'v', long = "verbosity", default_value = "INFO")]
    verbosity: String,

    /// Keep every step timing sample and write them to vahana_profiler.csv
    #[arg(long)]
    full_profiler: bool,

    /// Run without the viewer
    #[arg(long)]
    headless: bool,

    /// Stop after this many simulated seconds
    #[arg(long, value_name = "SECS")]
    max_time: Option<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match launch::log_filter(&cli.verbosity) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    log::info!("VahanaSim v{} starting...", env!("CARGO_PKG_VERSION"));

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::Relaxed);
    }) {
        log::warn!("Error setting Ctrl-C handler: {}", e);
    }

    let options = LaunchOptions {
        world_file: cli.world_file,
        full_profiler: cli.full_profiler,
        headless: cli.headless,
        max_time: cli.max_time,
    };

    match launch::run(&options, running) {
        Ok(()) => {
            log::info!("VahanaSim stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
