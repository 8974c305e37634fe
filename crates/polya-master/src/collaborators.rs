use polya_base::{Problem, ResultRecord};

pub trait ProblemSource {
    /// Produce variant `i` of `nvariants` for the next batch, or `None` once the
    /// source is exhausted (the master's cue to shut down).
    fn next_variant(&mut self, nvariants: u32, i: u32) -> Option<Problem>;
}

pub trait ResultSink {
    /// Called with the winning result and the problem record that was dispatched
    /// to the worker that produced it — not necessarily the variant whose index
    /// matches anything meaningful to the sink, just "the one that won".
    fn post_result(&mut self, result: ResultRecord, problem: Problem);
}
