//! Interrupt handling. SIGINT sets an atomic flag that the loopback polls
//! once per iteration; the default disposition is restored so a second ^C
//! kills the process the hard way. `request_stop` offers the same flag to
//! embedders and tests.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);

extern "C" fn sigint_handler(_: libc::c_int) {
    INTERRUPT_FLAG.store(true, Ordering::Relaxed);
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

pub fn register() {
    unsafe {
        libc::signal(libc::SIGINT, sigint_handler as libc::sighandler_t);
    }
}

pub fn interrupted() -> bool {
    INTERRUPT_FLAG.load(Ordering::Relaxed)
}

/// Asks a running loopback to shut down, exactly like a SIGINT would.
pub fn request_stop() {
    INTERRUPT_FLAG.store(true, Ordering::Relaxed);
}

/// Clears a previous interrupt request. Called before a new run starts.
pub fn reset() {
    INTERRUPT_FLAG.store(false, Ordering::Relaxed);
}
