//! The process-control surface the dispatcher needs: writing a problem down a
//! worker's down_pipe, reading a result off its up_pipe, delivering job-control
//! signals, and waiting for child-status events. Abstracted behind a trait so the
//! dispatcher's race-to-first-success logic (`crate::dispatch`) can be driven by
//! an in-memory fake in tests instead of real subprocesses.

use crate::state::ChildEvent;
use nix::unistd::Pid;
use polya_base::{Frame, Problem, ResultRecord};

#[derive(Clone, Copy, Debug)]
pub struct ChildStatusEvent {
    pub pid: Pid,
    pub kind: ChildEvent,
}

pub trait WorkerControl {
    fn write_problem(&mut self, worker_id: usize, problem: &Problem) -> anyhow::Result<()>;
    fn read_result(&mut self, worker_id: usize) -> anyhow::Result<Frame<ResultRecord>>;

    fn signal_continue(&mut self, pid: Pid) -> anyhow::Result<()>;
    fn signal_cancel(&mut self, pid: Pid) -> anyhow::Result<()>;
    fn signal_terminate(&mut self, pid: Pid) -> anyhow::Result<()>;

    /// Block until at least one child-status event is available, then drain and
    /// return every pending event non-blockingly.
    fn wait_for_child_events(&mut self) -> anyhow::Result<Vec<ChildStatusEvent>>;
}
