use crate::state::WorkerState;
use nix::unistd::Pid;
use polya_base::{Problem, ResultRecord};

#[allow(unused_variables)]
pub trait Instrumentation {
    fn sf_start(&mut self) {}
    fn sf_end(&mut self) {}
    fn sf_change_state(&mut self, pid: Pid, old: WorkerState, new: WorkerState) {}
    fn sf_send_problem(&mut self, pid: Pid, problem: &Problem) {}
    fn sf_recv_result(&mut self, pid: Pid, result: &ResultRecord) {}
    fn sf_cancel(&mut self, pid: Pid) {}
}

/// Does nothing. Used by tests that only care about the state machine.
#[derive(Default)]
pub struct NullInstrumentation;

impl Instrumentation for NullInstrumentation {}

/// Logs every hook at `debug` with structured fields, the way the rest of this
/// codebase's ancestors log state changes.
pub struct SlogInstrumentation {
    pub log: slog::Logger,
}

impl Instrumentation for SlogInstrumentation {
    fn sf_start(&mut self) {
        slog::info!(self.log, "master starting");
    }

    fn sf_end(&mut self) {
        slog::info!(self.log, "master exiting");
    }

    fn sf_change_state(&mut self, pid: Pid, old: WorkerState, new: WorkerState) {
        slog::debug!(self.log, "worker state change"; "pid" => pid.as_raw(), "old" => %old, "new" => %new);
    }

    fn sf_send_problem(&mut self, pid: Pid, problem: &Problem) {
        slog::debug!(self.log, "sending problem";
            "pid" => pid.as_raw(), "type" => problem.r#type(), "variant" => problem.variant());
    }

    fn sf_recv_result(&mut self, pid: Pid, result: &ResultRecord) {
        slog::debug!(self.log, "received result"; "pid" => pid.as_raw(), "failed" => result.is_failed());
    }

    fn sf_cancel(&mut self, pid: Pid) {
        slog::debug!(self.log, "cancelling worker"; "pid" => pid.as_raw());
    }
}
