//! The two signal-driven flags a worker's handlers set and its main loop
//! consumes: `PROCEED` (a `SIGCONT` arrived, there's a problem waiting on
//! stdin) and `CANCEL` (a `SIGHUP` arrived, give up on the current solve).
//! Kept as a standalone module so the flag lifecycle can be unit-tested
//! without forking or installing real signal handlers.

use std::sync::atomic::{AtomicBool, Ordering};

pub static PROCEED: AtomicBool = AtomicBool::new(false);
pub static CANCEL: AtomicBool = AtomicBool::new(false);

/// `true` and cleared, in one step — the main loop's way of asking "was I
/// told to continue since I last checked?".
pub fn take_proceed() -> bool {
    PROCEED.swap(false, Ordering::SeqCst)
}

pub fn clear_cancel() {
    CANCEL.store(false, Ordering::SeqCst);
}

pub extern "C" fn on_sighup(_: i32) {
    CANCEL.store(true, Ordering::SeqCst);
}

pub extern "C" fn on_sigcont(_: i32) {
    PROCEED.store(true, Ordering::SeqCst);
}

/// Matches the source's handler exactly: terminate immediately rather than
/// setting a flag for the main loop to notice later.
pub extern "C" fn on_sigterm(_: i32) {
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn proceed_is_consumed_once() {
        PROCEED.store(false, Ordering::SeqCst);
        on_sigcont(0);
        assert!(take_proceed());
        assert!(!take_proceed());
    }

    #[test]
    #[serial]
    fn cancel_persists_until_cleared() {
        CANCEL.store(false, Ordering::SeqCst);
        on_sighup(0);
        assert!(CANCEL.load(Ordering::SeqCst));
        clear_cancel();
        assert!(!CANCEL.load(Ordering::SeqCst));
    }
}
