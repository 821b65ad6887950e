//! Process-wide abort flag
//!
//! Cancellation is cooperative: long-running loops poll [`abort_requested`]
//! at their checkpoints. Call sites only ever go through these functions, so
//! the backing store can later become a scoped cancellation token.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

static ABORT: AtomicBool = AtomicBool::new(false);
static INTERRUPTS: AtomicU32 = AtomicU32::new(0);

/// Ask every loop in the process to stop at its next checkpoint.
pub fn request_abort() {
    if !ABORT.swap(true, Ordering::SeqCst) {
        log::warn!("[Abort] abort requested");
    }
}

/// Whether an abort has been requested and not yet reset.
pub fn abort_requested() -> bool {
    ABORT.load(Ordering::SeqCst)
}

/// Clear the flag before starting a fresh run.
pub fn reset_abort() {
    ABORT.store(false, Ordering::SeqCst);
}

/// Clear any earlier abort, then route Ctrl-C to [`request_abort`].
/// A second Ctrl-C exits the process with status 130.
pub fn install_interrupt_handler() -> Result<(), ctrlc::Error> {
    reset_abort();
    INTERRUPTS.store(0, Ordering::SeqCst);
    ctrlc::set_handler(on_interrupt)
}

fn on_interrupt() {
    if INTERRUPTS.fetch_add(1, Ordering::SeqCst) == 0 {
        log::warn!("[Abort] interrupt received, stopping after the current step (again to exit)");
        request_abort();
    } else {
        std::process::exit(130);
    }
}
