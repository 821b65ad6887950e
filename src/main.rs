//! Career Pilot CLI
//!
//! Usage: `pilot [settings.json]`. Without a path the defaults are used.
//! Ctrl-C requests a cooperative stop; a second Ctrl-C exits immediately.

use std::process::ExitCode;

use career_pilot::abort::install_interrupt_handler;
use career_pilot::career_loop_from_settings;
use career_pilot::config::Settings;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match std::env::args().nth(1) {
        Some(path) => match Settings::load(&path) {
            Ok(settings) => {
                log::info!("[Pilot] loaded settings from {}", path);
                settings
            }
            Err(e) => {
                log::error!("[Pilot] could not load {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            log::info!("[Pilot] no settings file given, using defaults");
            Settings::default()
        }
    };

    if let Err(e) = install_interrupt_handler() {
        log::warn!("[Pilot] could not install Ctrl-C handler: {}", e);
    }

    let mut career_loop = match career_loop_from_settings(&settings) {
        Ok(career_loop) => career_loop,
        Err(e) => {
            log::error!("[Pilot] {}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = career_loop.run();
    log::info!(
        "[Pilot] done: {} careers in {} iterations ({} failed) over {:.0}s, stop reason {:?}",
        summary.completed,
        summary.iterations,
        summary.failures,
        summary.elapsed.as_secs_f32(),
        summary.stop_reason
    );
    ExitCode::SUCCESS
}
