//! Career Pilot - perception-driven career loop automation
//!
//! This library drives a game client through repeated career runs. It looks
//! at the screen through a remote object detector and OCR service, clicks
//! through menus with a desktop or Android controller, and hands each started
//! career to an external training agent.
//!
//! ## Layers
//!
//! - `controller`: window discovery, capture and input (desktop, ADB, mirrored ADB)
//! - `perception`: detection and OCR clients, fuzzy text matching, debug frame dumps
//! - `career`: the waiter primitive, UI flows and the top-level loop
//!
//! ## Anti-Detection
//!
//! The `stealth` module provides humanization features to make automation
//! less detectable by adding realistic variance to timing and positions.

pub mod abort;
pub mod career;
pub mod config;
pub mod controller;
pub mod geometry;
pub mod perception;
pub mod stealth;

use crate::career::{CareerError, CareerLoop, ExternalCommandAgent, TrainingAgent, Waiter};
use crate::config::Settings;
use crate::controller::ControllerError;
use crate::perception::{Perception, PerceptionError};

/// Failures while wiring up a [`CareerLoop`]
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Controller setup failed: {0}")]
    Controller(#[from] ControllerError),
    #[error("Perception setup failed: {0}")]
    Perception(#[from] PerceptionError),
    #[error("Agent setup failed: {0}")]
    Agent(#[from] CareerError),
}

/// Build a career loop from settings with the given training agent
pub fn build_career_loop(
    settings: &Settings,
    agent: Box<dyn TrainingAgent>,
) -> Result<CareerLoop, SetupError> {
    let controller = controller::build(settings)?;
    log::info!("[Pilot] controller: {}", controller.name());
    let perception = Perception::remote(&settings.perception)?;
    let waiter = Waiter::new(controller, perception, &settings.waiter);
    Ok(CareerLoop::new(waiter, agent, settings))
}

/// Build a career loop whose agent is the configured external command
pub fn career_loop_from_settings(settings: &Settings) -> Result<CareerLoop, SetupError> {
    let agent = ExternalCommandAgent::new(&settings.career.agent_command)?;
    build_career_loop(settings, Box::new(agent))
}
