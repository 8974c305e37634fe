//! Illustrative solvers used by the `polya-worker` binary's default registry and
//! by the end-to-end tests. None of these are meant to be realistic problem
//! solvers; they exist to exercise the master/worker race with known, controllable
//! timing.

use crate::Solver;
use polya_base::{Problem, ResultRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Returns the payload unchanged. Always succeeds immediately.
pub struct EchoSolver;

impl Solver for EchoSolver {
    fn solve(&self, problem: &Problem, _cancel: &AtomicBool) -> Option<ResultRecord> {
        Some(ResultRecord::success(problem.data.clone()))
    }
}

/// Payload: an 8-byte little-endian millisecond delay, followed by arbitrary
/// trailing bytes. Sleeps in small increments, checking `cancel` between each, and
/// returns `None` as soon as it observes the flag set.
pub struct CancellableSleepSolver {
    pub step: Duration,
}

impl Default for CancellableSleepSolver {
    fn default() -> Self {
        CancellableSleepSolver {
            step: Duration::from_millis(1),
        }
    }
}

impl Solver for CancellableSleepSolver {
    fn solve(&self, problem: &Problem, cancel: &AtomicBool) -> Option<ResultRecord> {
        let (delay_ms, rest) = split_delay(&problem.data)?;
        let mut remaining = Duration::from_millis(delay_ms);
        while !remaining.is_zero() {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            let sleep_for = remaining.min(self.step);
            std::thread::sleep(sleep_for);
            remaining -= sleep_for;
        }
        Some(ResultRecord::success(rest.to_vec()))
    }
}

/// Same payload format as [`CancellableSleepSolver`], but never checks `cancel` —
/// a stand-in for a solver that ignores the cooperative cancellation hint and
/// completes anyway. Its result is still produced and still written; it's the
/// master's job (not the solver's) to discard it once the batch is resolved.
pub struct StubbornSleepSolver;

impl Solver for StubbornSleepSolver {
    fn solve(&self, problem: &Problem, _cancel: &AtomicBool) -> Option<ResultRecord> {
        let (delay_ms, rest) = split_delay(&problem.data)?;
        std::thread::sleep(Duration::from_millis(delay_ms));
        Some(ResultRecord::success(rest.to_vec()))
    }
}

fn split_delay(data: &[u8]) -> Option<(u64, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let delay_ms = u64::from_le_bytes(data[..8].try_into().unwrap());
    Some((delay_ms, &data[8..]))
}
