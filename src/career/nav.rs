//! Main menu to support formation

use super::types::CareerStep;
use super::waiter::{Query, Waiter};
use super::{soften, CareerError};
use crate::config::{CareerSettings, WaiterSettings};

/// Walks from the main menu into career setup and through its screens
#[derive(Debug, Clone)]
pub struct CareerNavFlow {
    navigation_timeout_ms: u64,
    transition_timeout_ms: u64,
    next_threshold: f32,
}

impl CareerNavFlow {
    pub fn new(career: &CareerSettings, waiter: &WaiterSettings) -> Self {
        Self {
            navigation_timeout_ms: career.navigation_timeout_ms,
            transition_timeout_ms: career.transition_timeout_ms,
            next_threshold: waiter.default_threshold,
        }
    }

    /// Home anchor, then the career entry. Either miss fails the step.
    pub fn navigate_to_career(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("CareerNavFlow", self.try_navigate(w))
    }

    fn try_navigate(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        log::info!("[CareerNavFlow] navigating from main menu to career");
        let home = Query::new(&["ui_home"], "career_nav_home").timeout_ms(self.navigation_timeout_ms);
        if !w.click_when(&home)? {
            log::warn!("[CareerNavFlow] ui_home not found");
            return Ok(false);
        }

        let career =
            Query::new(&["ui_career"], "career_nav_career").timeout_ms(self.navigation_timeout_ms);
        if !w.click_when(&career)? {
            log::warn!("[CareerNavFlow] ui_career not found");
            return Ok(false);
        }
        log::info!("[CareerNavFlow] entered career mode");
        Ok(true)
    }

    /// Classify the current setup screen from its step indicator
    pub fn current_step(&self, w: &mut Waiter) -> Result<CareerStep, CareerError> {
        let frame = match w.recognize("career_step_extract") {
            Ok(frame) => frame,
            Err(CareerError::Aborted) => return Err(CareerError::Aborted),
            Err(e) => {
                log::warn!("[CareerNavFlow] step extraction failed: {}", e);
                return Ok(CareerStep::Unknown);
            }
        };
        let Some(indicator) = frame.of_class(&["career_step"]).first().copied() else {
            log::debug!("[CareerNavFlow] no career_step indicator");
            return Ok(CareerStep::Unknown);
        };
        let text = w.text_in(&frame, &indicator.xyxy);
        let step = CareerStep::from_indicator_text(&text);
        log::debug!("[CareerNavFlow] step indicator '{}' -> {}", text.trim(), step);
        Ok(step)
    }

    /// Advance one setup screen. Support formation is left to the support flow.
    pub fn handle_setup_screen(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("CareerNavFlow", self.try_handle_setup_screen(w))
    }

    fn try_handle_setup_screen(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let step = self.current_step(w)?;
        match step {
            CareerStep::SupportFormation => {
                log::info!("[CareerNavFlow] on support formation screen");
                Ok(true)
            }
            CareerStep::ScenarioSelect | CareerStep::TraineeSelect | CareerStep::LegacySelect => {
                log::info!("[CareerNavFlow] on {} screen", step);
                self.click_next(w)
            }
            CareerStep::Unknown => {
                log::debug!("[CareerNavFlow] unknown step, falling back to Next");
                self.click_next(w)
            }
        }
    }

    fn click_next(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let next = Query::new(&["button_green"], "career_nav_next")
            .texts(&["next"])
            .threshold(self.next_threshold)
            .timeout_ms(self.transition_timeout_ms);
        let clicked = w.click_when(&next)?;
        if !clicked {
            log::warn!("[CareerNavFlow] Next button not found");
        }
        Ok(clicked)
    }
}
