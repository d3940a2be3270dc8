use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CpucapError, Result};

// Written exactly once, by the signal handler. Everything else only polls.
static QUIT: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT/SIGTERM handler. Call once at startup; the flag is
/// never reset for the lifetime of the process.
pub fn install() -> Result<()> {
    ctrlc::set_handler(|| QUIT.store(true, Ordering::Relaxed))
        .map_err(|e| CpucapError::Signal(e.to_string()))
}

/// Whether a quit signal has been observed. Polled at slice boundaries by
/// the controller, never checked inside a blocking sleep.
pub fn requested() -> bool {
    QUIT.load(Ordering::Relaxed)
}
