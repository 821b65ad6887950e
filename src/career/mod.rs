//! Career automation
//!
//! The [`runner::CareerLoop`] drives whole careers: navigate from the main
//! menu through the setup screens, borrow a support card, confirm the start,
//! hand control to the training agent, then click back home. Every UI step is
//! a [`waiter::Waiter`] call, so uncertainty about what is on screen is
//! resolved in one place.
//!
//! ## Failure model
//!
//! A missed detection is `Ok(false)`, never an error. Errors from the
//! controller or perception are turned into `Ok(false)` at flow boundaries by
//! [`soften`]. Only [`CareerError::Aborted`] travels all the way up.

pub mod agent;
pub mod completion;
pub mod nav;
pub mod runner;
pub mod start;
pub mod support;
pub mod types;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testing;

use std::thread;
use std::time::{Duration, Instant};

use crate::abort::abort_requested;
use crate::controller::ControllerError;
use crate::perception::PerceptionError;

pub use agent::{ExternalCommandAgent, ResettableState, TrainingAgent};
pub use runner::{CareerLoop, LoopSummary, StopHandle, StopReason};
pub use types::{CareerLoopState, CareerStep, SupportCardInfo};
pub use waiter::{Query, Waiter};

/// Career loop errors
#[derive(Debug, thiserror::Error)]
pub enum CareerError {
    #[error("Aborted")]
    Aborted,
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),
    #[error("Training agent failed: {0}")]
    Agent(String),
    #[error("Gave up: {0} exhausted")]
    Exhausted(&'static str),
}

impl CareerError {
    pub fn is_abort(&self) -> bool {
        matches!(self, CareerError::Aborted)
    }
}

/// Flow boundary: keep aborts, log and flatten every other error to `false`.
pub fn soften(step: &str, result: Result<bool, CareerError>) -> Result<bool, CareerError> {
    match result {
        Err(CareerError::Aborted) => Err(CareerError::Aborted),
        Err(e) => {
            log::error!("[{}] {}", step, e);
            Ok(false)
        }
        ok => ok,
    }
}

/// Abort checkpoint
pub fn checkpoint() -> Result<(), CareerError> {
    if abort_requested() {
        Err(CareerError::Aborted)
    } else {
        Ok(())
    }
}

/// Sleep that wakes up early, with an error, when an abort is requested
pub fn pause(duration: Duration) -> Result<(), CareerError> {
    let slice = Duration::from_millis(50);
    let deadline = Instant::now() + duration;
    loop {
        checkpoint()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(slice.min(deadline - now));
    }
}

/// Scales every fixed wait and waiter timeout
///
/// `Pacing::real()` keeps the timings tuned against the game; tests run with
/// `Pacing::instant()` so each waiter query polls exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    factor: f32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::real()
    }
}

impl Pacing {
    pub fn real() -> Self {
        Self { factor: 1.0 }
    }

    pub fn instant() -> Self {
        Self { factor: 0.0 }
    }

    pub fn scaled(factor: f32) -> Self {
        Self {
            factor: factor.max(0.0),
        }
    }

    pub fn scale(&self, duration: Duration) -> Duration {
        duration.mul_f32(self.factor)
    }

    pub fn ms(&self, ms: u64) -> Duration {
        self.scale(Duration::from_millis(ms))
    }
}
