//! Training agent boundary
//!
//! The agent plays a career once it has started. The loop only needs to run
//! it, stop it, and optionally clear its per-career memory.

use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::CareerError;
use crate::abort::abort_requested;

/// Per-career memory an agent can clear before a new career
pub trait ResettableState {
    fn reset_for_new_career(&mut self);
}

/// Plays a career until its own completion condition
pub trait TrainingAgent: Send {
    /// Block until the career is played out
    fn run(&mut self) -> Result<(), CareerError>;

    /// Best-effort request to stop as soon as possible
    fn emergency_stop(&self) {}

    /// The agent's resettable memory, if it keeps any
    fn resettable(&mut self) -> Option<&mut dyn ResettableState> {
        None
    }
}

/// Clear per-career memory if the agent has any
pub fn reset_agent_state(agent: &mut dyn TrainingAgent) {
    match agent.resettable() {
        Some(state) => {
            state.reset_for_new_career();
            log::info!("[CareerLoop] agent state reset");
        }
        None => log::debug!("[CareerLoop] agent keeps no per-career state"),
    }
}

/// Runs an external program as the training agent
///
/// The child is polled for exit; an abort or emergency stop kills it.
pub struct ExternalCommandAgent {
    program: String,
    args: Vec<String>,
    poll: Duration,
    child: Mutex<Option<Child>>,
    stop: AtomicBool,
}

fn lock(m: &Mutex<Option<Child>>) -> MutexGuard<'_, Option<Child>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ExternalCommandAgent {
    /// `command` is the program followed by its arguments
    pub fn new(command: &[String]) -> Result<Self, CareerError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CareerError::Agent("agent command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            poll: Duration::from_millis(200),
            child: Mutex::new(None),
            stop: AtomicBool::new(false),
        })
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn kill_child(&self) {
        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.kill();
            let _ = child.wait();
            log::info!("[Agent] killed '{}'", self.program);
        }
    }
}

impl TrainingAgent for ExternalCommandAgent {
    fn run(&mut self) -> Result<(), CareerError> {
        self.stop.store(false, Ordering::SeqCst);
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| CareerError::Agent(format!("failed to start '{}': {}", self.program, e)))?;
        log::info!("[Agent] started '{}' (pid {})", self.program, child.id());
        *lock(&self.child) = Some(child);

        loop {
            if abort_requested() || self.stop.load(Ordering::SeqCst) {
                self.kill_child();
                return Err(CareerError::Aborted);
            }

            let status = {
                let mut guard = lock(&self.child);
                let Some(child) = guard.as_mut() else {
                    return Err(CareerError::Aborted);
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        guard.take();
                        Some(status)
                    }
                    Ok(None) => None,
                    Err(e) => return Err(CareerError::Agent(format!("wait failed: {e}"))),
                }
            };

            if let Some(status) = status {
                return if status.success() {
                    log::info!("[Agent] '{}' finished", self.program);
                    Ok(())
                } else {
                    Err(CareerError::Agent(format!("'{}' exited with {}", self.program, status)))
                };
            }
            thread::sleep(self.poll);
        }
    }

    fn emergency_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.kill_child();
    }
}

impl Drop for ExternalCommandAgent {
    fn drop(&mut self) {
        self.kill_child();
    }
}
