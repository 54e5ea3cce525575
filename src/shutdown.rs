//! Process-wide shutdown flag
//!
//! The flag only ever goes from running to stopped. Reader threads and the
//! control loop poll it; setting it is all that graceful termination needs.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, set-once stop request
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    stopped: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Signal flipped by SIGINT
static SIGINT_TARGET: OnceCell<ShutdownSignal> = OnceCell::new();

/// Route Ctrl+C to `signal`.
///
/// Only the first installed signal is used. On non-Unix platforms this is a
/// no-op and the menu's exit item is the way out.
pub fn install_ctrlc_handler(signal: &ShutdownSignal) -> std::io::Result<()> {
    if SIGINT_TARGET.set(signal.clone()).is_err() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let handler = handle_sigint as extern "C" fn(libc::c_int);
        // SAFETY: the handler only performs an atomic store
        let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    Ok(())
}

#[cfg(unix)]
extern "C" fn handle_sigint(_: libc::c_int) {
    if let Some(signal) = SIGINT_TARGET.get() {
        signal.trigger();
    }
}
