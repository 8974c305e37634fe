//! An in-memory demonstration `ProblemSource`/`ResultSink` pair for the `polya` binary.

use polya_base::{Problem, ResultRecord};
use polya_master::{ProblemSource, ResultSink};

/// Problem type dispatched to `CancellableSleepSolver` in the default worker
/// registry.
const SLEEP_PROBLEM_TYPE: u32 = 1;

pub struct DemoProblemSource {
    remaining_batches: u32,
}

impl DemoProblemSource {
    pub fn new(batches: u32) -> Self {
        DemoProblemSource { remaining_batches: batches }
    }
}

impl ProblemSource for DemoProblemSource {
    fn next_variant(&mut self, nvariants: u32, i: u32) -> Option<Problem> {
        if i == 0 {
            if self.remaining_batches == 0 {
                return None;
            }
            self.remaining_batches -= 1;
        }
        // Variant i sleeps i * 20ms before succeeding, so the lowest-numbered
        // worker wins every race — enough to see cancellation happen without
        // any real randomness.
        let delay_ms = u64::from(i) * 20;
        let mut data = delay_ms.to_le_bytes().to_vec();
        data.push(i as u8);
        Some(Problem::new(SLEEP_PROBLEM_TYPE, i, nvariants, data))
    }
}

pub struct DemoResultSink {
    pub log: slog::Logger,
}

impl ResultSink for DemoResultSink {
    fn post_result(&mut self, result: ResultRecord, problem: Problem) {
        slog::info!(self.log, "batch solved";
            "winning_variant" => problem.variant(),
            "payload_len" => result.data.len());
    }
}
