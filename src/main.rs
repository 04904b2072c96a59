#![windows_subsystem = "windows"]

mod compositor;
mod data_loaders;
mod error;
mod gallery_connector;
mod history;
mod logging;
mod paths;
mod platform;
mod reconcile;
mod rotation_engine;
mod transform;
mod utility;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use crate::{
    data_loaders::config::RotatorConfig,
    gallery_connector::HttpGallery,
    history::HistoryLedger,
    rotation_engine::{
        command_channel, EngineOptions, RotationEngine, RotatorCommand, RunContext,
    },
};

pub const ADDON_NAME: &str = "rotator";
pub const DEBUG_NAME: &str = "ROTATOR";

fn main() {
    logging::init(false, "warn");

    let config_path = paths::addon_config_path();
    let config = RotatorConfig::load(&config_path).unwrap_or_else(|| {
        warn!(
            "[{}] No usable config at {}; running with defaults",
            DEBUG_NAME,
            config_path.display()
        );
        RotatorConfig::default()
    });

    logging::set_debug(config.debug);
    logging::set_level(&config.log_level);
    panic::set_hook(Box::new(|panic_info| {
        error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
    }));

    info!("!---------- [{}] Starting Wallpaper Rotator ----------!", DEBUG_NAME);
    info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());
    info!(
        "[{}] Gallery {} -> destination {}",
        DEBUG_NAME,
        config.settings.gallery.base_url,
        config.destination_dir().display()
    );

    let engine = RotationEngine::new(
        Box::new(HttpGallery::new(
            &config.settings.gallery.base_url,
            config.request_timeout(),
        )),
        platform::wallpaper_target(),
        platform::monitor_topology(),
        HistoryLedger::new(paths::ledger_path()),
        config.destination_dir(),
        EngineOptions::from_config(&config),
    );

    // The handle goes to the tray/UI layer when this runs embedded; standalone
    // runs keep it alive so the channel stays connected.
    let (_handle, commands) = command_channel();
    run_scheduler(&engine, &config, &commands);
}

/// Recurring scheduler: one cycle per poll interval, plus out-of-band RunNow
/// triggers. Single-threaded on purpose: at most one cycle ever executes at
/// a time, so the reconciler and the ledger have exactly one writer.
fn run_scheduler(engine: &RotationEngine, config: &RotatorConfig, commands: &Receiver<RotatorCommand>) {
    let mut ctx = RunContext::from_config(config);
    let poll_interval = config.poll_interval();
    let tick_sleep = Duration::from_millis(config.settings.runtime.tick_sleep_ms.max(50));

    // First cycle fires immediately on startup.
    let mut next_run = Instant::now();
    let mut run_requested = false;

    loop {
        loop {
            match commands.try_recv() {
                Ok(RotatorCommand::RunNow) => {
                    info!("[{}] Manual cycle requested", DEBUG_NAME);
                    run_requested = true;
                }
                Ok(RotatorCommand::Stop) => {
                    info!("[{}] Stop requested — leaving scheduler loop", DEBUG_NAME);
                    return;
                }
                Ok(RotatorCommand::ToggleStitch) => {
                    ctx.stitch_enabled = !ctx.stitch_enabled;
                    info!(
                        "[{}] Stitch mode now {}",
                        DEBUG_NAME,
                        if ctx.stitch_enabled { "on" } else { "off" }
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if run_requested || Instant::now() >= next_run {
            run_requested = false;

            // Nothing may escape and kill the recurring loop; a panicking
            // cycle is logged and the next interval proceeds as scheduled.
            match panic::catch_unwind(AssertUnwindSafe(|| engine.run_cycle(&mut ctx))) {
                Ok(report) => {
                    info!(
                        "[{}][CYCLE] #{} phase={:?} outcome={} discovered={} accepted={} committed={} updated={} applied={}",
                        DEBUG_NAME,
                        ctx.cycles_run,
                        report.phase,
                        report.outcome.map(|o| o.as_str()).unwrap_or("none"),
                        report.discovered,
                        report.accepted,
                        report.committed,
                        report.updated,
                        report.applied
                    );
                }
                Err(_) => {
                    error!("[{}][CYCLE] Cycle panicked; continuing with next interval", DEBUG_NAME);
                }
            }

            next_run = Instant::now() + poll_interval;
        }

        thread::sleep(tick_sleep);
    }
}
