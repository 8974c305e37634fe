//! A small process-exit-status helper, so fallible `main` functions can report a
//! specific nonzero code instead of panicking or always exiting 1.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExitCode(u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

impl From<u8> for ExitCode {
    fn from(code: u8) -> Self {
        ExitCode(code)
    }
}

impl std::process::Termination for ExitCode {
    fn report(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.0)
    }
}

/// Tracks the worst exit code seen across many independent operations (e.g. one
/// per dispatched batch), so the process can report failure without losing track
/// of successes that happened alongside it.
#[derive(Default)]
pub struct ExitCodeAccumulator(AtomicU8);

impl ExitCodeAccumulator {
    pub fn add(&self, code: ExitCode) {
        self.0.fetch_max(code.0, Ordering::AcqRel);
    }

    pub fn get(&self) -> ExitCode {
        ExitCode(self.0.load(Ordering::Acquire))
    }
}
