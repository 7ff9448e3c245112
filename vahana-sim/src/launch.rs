//! Real-time simulation loop.
//!
//! ```text
//! loop every ~10 ms:
//!   advance(wall_elapsed − simul_time)     whole sub-steps only
//!   drain the viewer key slot
//!     Esc      → exit
//!     1..6     → select vehicle
//!     other    → teleop of the selected entity
//!   publish status text for the viewer
//! ```
//!
//! The viewer thread (if any) is always asked to close and joined before
//! returning, including on a fatal step error.

use crate::config::WorldConfig;
use crate::core::simulable::{TeleopInput, TeleopOutput};
use crate::core::types::{KeyCode, KeyEvent};
use crate::error::{Error, Result};
use crate::gui::{spawn_gui_thread, GuiContext, GuiScene, TerminalViewer};
use crate::world::profiler::PROFILER_CSV;
use crate::world::{TimeLogger, World};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Simulation thread pacing
const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// How often the terminal viewer reports the scene
const TERMINAL_REPORT_PERIOD: Duration = Duration::from_secs(1);

/// Options collected from the command line
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub world_file: PathBuf,
    /// Keep every profiler sample and write them to CSV on exit
    pub full_profiler: bool,
    /// Run without the viewer thread
    pub headless: bool,
    /// Stop after this much simulated time (seconds)
    pub max_time: Option<f64>,
}

/// Key handling state of the simulation loop
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    /// Entity receiving teleop keys
    pub selected: usize,
    /// Lines returned by the selected entity's teleop handler
    pub teleop: TeleopOutput,
}

/// Handle one (possibly absent) key; returns `false` when the run must stop
pub fn process_key(world: &mut World, state: &mut LoopState, key: Option<KeyEvent>) -> bool {
    let mut forwarded = key;

    if let Some(k) = key {
        if k.code == KeyCode::Escape {
            log::info!("Exit key pressed");
            return false;
        }
        if let Some(index) = k.vehicle_index() {
            if index < world.entities().len() {
                state.selected = index;
                log::info!("Selected vehicle {} ({})", index + 1, world.entities()[index].name());
            } else {
                log::info!("No vehicle #{}", index + 1);
            }
            forwarded = None;
        }
    }

    if let Some(output) = world.teleop(state.selected, &TeleopInput { key: forwarded }) {
        state.teleop = output;
    }
    true
}

/// Status text shown by the viewer
pub fn status_text(world: &World, state: &LoopState) -> String {
    let mut lines = Vec::new();
    match world.entities().get(state.selected) {
        Some(entity) => {
            let twist = entity.twist();
            lines.push(format!(
                "Selected vehicle: {}/{} ({})",
                state.selected + 1,
                world.entities().len(),
                entity.name()
            ));
            lines.push(format!(
                "gt. vel: lx={:7.03}, ly={:7.03}, w={:7.03}deg/s",
                twist.vx,
                twist.vy,
                twist.omega.to_degrees()
            ));
        }
        None => lines.push("No vehicle selected".to_string()),
    }
    lines.extend(state.teleop.lines.iter().cloned());
    lines.push(format!("t = {:.2} s", world.simul_time()));
    lines.join("\n")
}

/// Load the world and run it until exit key, viewer close, Ctrl-C or `max_time`
pub fn run(options: &LaunchOptions, running: Arc<AtomicBool>) -> Result<()> {
    log::info!("Loading world {}", options.world_file.display());
    let config = WorldConfig::load(&options.world_file)?;
    let mut world = World::from_config(&config)?;
    world.set_profiler(TimeLogger::new(options.full_profiler));

    let gui = Arc::new(GuiContext::new());
    let gui_thread = if options.headless {
        log::info!("Running headless");
        None
    } else {
        let (entity_views, sensor_views) = world.gui_views();
        let viewer = TerminalViewer::new(TERMINAL_REPORT_PERIOD)?;
        Some(spawn_gui_thread(
            Arc::clone(&gui),
            GuiScene::new(entity_views, sensor_views),
            Box::new(viewer),
            Duration::from_millis(config.gui.refresh_period_ms),
        )?)
    };

    let result = run_loop(&mut world, &gui, &running, options.max_time);

    gui.request_closing();
    if let Some(handle) = gui_thread {
        if handle.join().is_err() {
            log::error!("Viewer thread panicked");
        }
    }

    log::info!(
        "Stopped at t = {:.3} s after {} steps ({} callback errors)",
        world.simul_time(),
        world.step_count(),
        world.step_errors()
    );
    log::info!("Step timing:\n{}", world.profiler().summary());
    if options.full_profiler {
        match world.profiler().write_csv(PROFILER_CSV) {
            Ok(()) => log::info!("Profiler samples written to {}", PROFILER_CSV),
            Err(e) => log::error!("Failed to write {}: {}", PROFILER_CSV, e),
        }
    }

    result
}

fn run_loop(
    world: &mut World,
    gui: &GuiContext,
    running: &AtomicBool,
    max_time: Option<f64>,
) -> Result<()> {
    let start = Instant::now();
    let mut state = LoopState::default();

    while running.load(Ordering::Relaxed) {
        let wall = start.elapsed().as_secs_f64();
        match world.advance(wall - world.simul_time()) {
            Ok(_) => {}
            Err(e) if !e.is_fatal() => log::warn!("Step error: {}", e),
            Err(e) => {
                log::error!("Simulation aborted: {}", e);
                return Err(e);
            }
        }

        if max_time.is_some_and(|t| world.simul_time() >= t) {
            log::info!("Reached max time");
            break;
        }

        if !process_key(world, &mut state, gui.take_key()) {
            break;
        }
        gui.set_status(status_text(world, &state));

        if gui.viewer_close_requested() {
            break;
        }
        thread::sleep(LOOP_PERIOD);
    }

    if !running.load(Ordering::Relaxed) {
        log::info!("Received shutdown signal");
    }
    Ok(())
}

/// Parse the `-v` level into a log filter
pub fn log_filter(level: &str) -> Result<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Ok("trace"),
        "DEBUG" => Ok("debug"),
        "INFO" => Ok("info"),
        "WARN" | "WARNING" => Ok("warn"),
        "ERROR" => Ok("error"),
        other => Err(Error::Config(format!("unknown verbosity level '{}'", other))),
    }
}
