//! Top-level career loop
//!
//! One cycle walks menu → setup screens → support → start → agent →
//! completion. Cycles are retried with a return-home recovery in between;
//! the outer loop stops on abort, on the career limit, or once consecutive
//! failures reach the error threshold.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::agent::{reset_agent_state, TrainingAgent};
use super::completion::CompletionFlow;
use super::nav::CareerNavFlow;
use super::start::StartFlow;
use super::support::SupportSelectFlow;
use super::types::CareerLoopState;
use super::waiter::{Query, Waiter};
use super::CareerError;
use crate::abort::{abort_requested, request_abort};
use crate::config::{CareerSettings, Settings};

/// Why [`CareerLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Abort flag raised or the loop was stopped
    Aborted,
    MaxCareers,
    ErrorThreshold,
}

/// Tallies of one [`CareerLoop::run`]
#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub iterations: u32,
    pub completed: u32,
    pub failures: u32,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// Stops a running loop from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Clear the running flag and raise the process-wide abort. An
    /// [`ExternalCommandAgent`](super::ExternalCommandAgent) sees the abort and
    /// kills its child.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        request_abort();
    }
}

pub struct CareerLoop {
    waiter: Waiter,
    agent: Box<dyn TrainingAgent>,
    nav: CareerNavFlow,
    support: SupportSelectFlow,
    start: StartFlow,
    completion: CompletionFlow,
    cfg: CareerSettings,
    state: CareerLoopState,
    running: Arc<AtomicBool>,
}

impl CareerLoop {
    pub fn new(waiter: Waiter, agent: Box<dyn TrainingAgent>, settings: &Settings) -> Self {
        Self {
            waiter,
            agent,
            nav: CareerNavFlow::new(&settings.career, &settings.waiter),
            support: SupportSelectFlow::new(&settings.support),
            start: StartFlow::new(&settings.career, &settings.waiter),
            completion: CompletionFlow::new(&settings.career, &settings.waiter),
            cfg: settings.career.clone(),
            state: CareerLoopState::default(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> &CareerLoopState {
        &self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Stop the loop, raise the abort flag and forward the stop to the agent
    pub fn emergency_stop(&self) {
        log::warn!("[CareerLoop] emergency stop requested");
        self.running.store(false, Ordering::SeqCst);
        request_abort();
        self.agent.emergency_stop();
    }

    /// Run careers until aborted, the career limit, or the error threshold
    pub fn run(&mut self) -> LoopSummary {
        let max = self.cfg.max_careers;
        log::info!(
            "[CareerLoop] starting: max_careers={} error_threshold={}",
            if max == 0 { "unlimited".to_string() } else { max.to_string() },
            self.cfg.error_threshold
        );
        self.running.store(true, Ordering::SeqCst);
        self.state.is_running = true;

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_passes()));
        self.state.is_running = false;
        self.running.store(false, Ordering::SeqCst);
        let (stop_reason, iterations, failures) = match outcome {
            Ok(tallies) => tallies,
            Err(payload) => {
                log::error!("[CareerLoop] panicked, loop marked as stopped");
                panic::resume_unwind(payload)
            }
        };

        log::info!(
            "[CareerLoop] stopped ({:?}): total_careers={} consecutive_errors={} last_error='{}'",
            stop_reason,
            self.state.total_careers_completed,
            self.state.consecutive_errors,
            self.state.last_error.as_deref().unwrap_or("none")
        );
        LoopSummary {
            iterations,
            completed: self.state.total_careers_completed,
            failures,
            elapsed: started.elapsed(),
            stop_reason,
        }
    }

    /// Loop passes until a stop condition; returns the reason, iterations and failures
    fn run_passes(&mut self) -> (StopReason, u32, u32) {
        let max = self.cfg.max_careers;
        let mut iterations = 0;
        let mut failures = 0;

        let stop_reason = loop {
            if abort_requested() || !self.running.load(Ordering::SeqCst) {
                log::info!("[CareerLoop] abort requested, stopping");
                break StopReason::Aborted;
            }
            if max > 0 && self.state.total_careers_completed >= max {
                log::info!("[CareerLoop] reached max careers ({}), stopping", max);
                break StopReason::MaxCareers;
            }
            if self.state.consecutive_errors >= self.cfg.error_threshold {
                log::error!(
                    "[CareerLoop] {} consecutive errors, stopping",
                    self.state.consecutive_errors
                );
                break StopReason::ErrorThreshold;
            }

            iterations += 1;
            log::info!(
                "[CareerLoop] iteration {}: completed={} consecutive_errors={}",
                iterations,
                self.state.total_careers_completed,
                self.state.consecutive_errors
            );

            let cycle_start = Instant::now();
            match self.execute_cycle_with_recovery() {
                Ok(true) => log::info!(
                    "[CareerLoop] cycle {} succeeded in {:.1}s",
                    iterations,
                    cycle_start.elapsed().as_secs_f32()
                ),
                Ok(false) => {
                    failures += 1;
                    log::warn!(
                        "[CareerLoop] cycle {} failed after {:.1}s",
                        iterations,
                        cycle_start.elapsed().as_secs_f32()
                    );
                }
                Err(_) => break StopReason::Aborted,
            }

            if self.waiter.settle(1000).is_err() {
                break StopReason::Aborted;
            }
        };
        (stop_reason, iterations, failures)
    }

    /// Retry one cycle up to `cycle_attempts` times. `Err` only on abort.
    fn execute_cycle_with_recovery(&mut self) -> Result<bool, CareerError> {
        let attempts = self.cfg.cycle_attempts.max(1);
        for attempt in 1..=attempts {
            log::debug!("[CareerLoop] cycle attempt {}/{}", attempt, attempts);
            let error = match self.execute_cycle() {
                Ok(true) => {
                    self.state.record_success();
                    log::info!(
                        "[CareerLoop] career cycle succeeded (total: {})",
                        self.state.total_careers_completed
                    );
                    return Ok(true);
                }
                Ok(false) => format!("career cycle failed on attempt {attempt}/{attempts}"),
                Err(CareerError::Aborted) => return Err(CareerError::Aborted),
                Err(e) => format!("career cycle error on attempt {attempt}/{attempts}: {e}"),
            };
            log::warn!("[CareerLoop] {}", error);

            if attempt < attempts {
                self.return_to_main_menu()?;
                self.waiter.settle(self.cfg.retry_backoff_ms)?;
            } else {
                self.state.record_error(error);
                log::error!(
                    "[CareerLoop] all attempts exhausted ({} consecutive errors)",
                    self.state.consecutive_errors
                );
            }
        }
        Ok(false)
    }

    fn execute_cycle(&mut self) -> Result<bool, CareerError> {
        log::info!(
            "[CareerLoop] starting career cycle {}",
            self.state.total_careers_completed + 1
        );
        self.state.start_career();
        let started = Instant::now();

        if self.check_if_in_career()? {
            log::info!("[CareerLoop] resumed career finished, handling completion");
            return self.completion.handle_career_completion(&mut self.waiter);
        }
        if self.completion.handle_career_completion(&mut self.waiter)? {
            log::info!("[CareerLoop] finished a career left on the completion screen");
            return Ok(true);
        }

        if !self.nav.navigate_to_career(&mut self.waiter)? {
            log::error!("[CareerLoop] failed to navigate to career");
            return Ok(false);
        }
        self.walk_setup_screens()?;

        if !self.support.select_optimal_support(&mut self.waiter)? {
            log::error!("[CareerLoop] failed to select a support card");
            return Ok(false);
        }
        if !self.start.confirm_career_start(&mut self.waiter)? {
            log::error!("[CareerLoop] failed to confirm career start");
            return Ok(false);
        }
        self.waiter.settle(3000)?;

        if !self.start.handle_skip_dialog(&mut self.waiter)? {
            log::warn!("[CareerLoop] skip dialog not handled, continuing");
        }
        reset_agent_state(self.agent.as_mut());
        log::info!("[CareerLoop] running training agent");
        self.agent.run()?;

        if !self.completion.handle_career_completion(&mut self.waiter)? {
            log::error!("[CareerLoop] failed to handle career completion");
            return Ok(false);
        }
        let secs = started.elapsed().as_secs_f32();
        log::info!(
            "[CareerLoop] career cycle completed in {:.1}s ({:.1} min)",
            secs,
            secs / 60.0
        );
        Ok(true)
    }

    /// Advance setup screens until the support popup entry shows
    fn walk_setup_screens(&mut self) -> Result<(), CareerError> {
        let cap = self.cfg.setup_max_screens;
        for n in 1..=cap {
            let frame = self.waiter.recognize("career_cycle_check")?;
            if frame.has(&["career_add_friend_support"]) {
                log::info!("[CareerLoop] reached support formation");
                return Ok(());
            }
            log::debug!("[CareerLoop] setup screen {}/{}", n, cap);
            if !self.nav.handle_setup_screen(&mut self.waiter)? {
                log::warn!("[CareerLoop] setup screen {} not advanced", n);
            }
            self.waiter.settle(1000)?;
        }
        log::error!("[CareerLoop] still in setup after {} screens", cap);
        Err(CareerError::Exhausted("setup screens"))
    }

    /// Resume an in-progress career: reset the agent and run it to the end
    fn check_if_in_career(&mut self) -> Result<bool, CareerError> {
        let frame = match self.waiter.recognize("career_check_in_career") {
            Ok(frame) => frame,
            Err(CareerError::Aborted) => return Err(CareerError::Aborted),
            Err(e) => {
                log::warn!("[CareerLoop] in-career check failed: {}", e);
                return Ok(false);
            }
        };
        let Some(indicator) = frame.of_class(&["career_step"]).first().copied() else {
            return Ok(false);
        };
        if !self.waiter.perception().has_ocr() {
            log::warn!("[CareerLoop] no OCR, cannot read the career step");
            return Ok(false);
        }
        let text = self.waiter.text_in(&frame, &indicator.xyxy).trim().to_lowercase();
        log::debug!("[CareerLoop] career_step reads '{}'", text);

        if text.contains("complete") {
            return Ok(false);
        }
        if !(text.contains("career") || text.contains("training")) {
            return Ok(false);
        }

        log::info!("[CareerLoop] already in a career ('{}'), resuming the agent", text);
        reset_agent_state(self.agent.as_mut());
        self.agent.run()?;
        Ok(true)
    }

    /// Best-effort click on the home anchor
    fn return_to_main_menu(&mut self) -> Result<bool, CareerError> {
        log::info!("[CareerLoop] returning to main menu for recovery");
        let home = Query::new(&["ui_home"], "career_loop_recovery").timeout_ms(5000);
        match self.waiter.click_when(&home) {
            Ok(true) => {
                self.waiter.settle(1000)?;
                Ok(true)
            }
            Ok(false) => {
                log::warn!("[CareerLoop] ui_home not found for recovery");
                Ok(false)
            }
            Err(CareerError::Aborted) => Err(CareerError::Aborted),
            Err(e) => {
                log::error!("[CareerLoop] recovery failed: {}", e);
                Ok(false)
            }
        }
    }
}
