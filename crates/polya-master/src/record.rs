//! The worker-record table: the master's only mutable bookkeeping about its
//! children.
//!
//! # Invariants
//! - Every non-`Exited`/`Aborted` record's `pid` names a live child whose stdin is
//!   its down_pipe's read end and whose stdout is its up_pipe's write end.
//! - `assigned` is `Some` iff `state` is `Continued` or `Running`, or the worker is
//!   `Stopped` with an unread result.
//! - `drained` is cleared whenever `assigned` is freshly set.
//! - A batch is resolved as soon as exactly one worker succeeds on it, or all `N`
//!   have failed.

use crate::state::{ChildEvent, WorkerState};
use nix::unistd::Pid;
use polya_base::Problem;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct WorkerRecord {
    pub id: usize,
    pub pid: Pid,
    pub state: WorkerState,
    pub assigned: Option<Problem>,
    pub drained: bool,
}

impl WorkerRecord {
    pub fn new(id: usize, pid: Pid) -> Self {
        WorkerRecord {
            id,
            pid,
            state: WorkerState::Started,
            assigned: None,
            drained: false,
        }
    }

    fn set_state(&mut self, new: WorkerState) {
        self.state = new;
    }

    pub fn assign(&mut self, problem: Problem) {
        self.assigned = Some(problem);
        self.drained = false;
    }

    pub fn clear_assignment(&mut self) {
        self.assigned = None;
    }
}

/// Level-triggered counts, updated alongside the table's only mutator
/// ([`WorkerTable::apply_event`] / [`WorkerTable::drain`]) and safe to snapshot at
/// any time — there is no concurrent writer once signal delivery is funneled
/// through a blocking read in the main loop (see [`crate::reconcile`]), but they
/// stay atomic to keep the type honest about the original design's cross-context
/// counters.
#[derive(Default)]
pub struct Counters {
    pub alive: AtomicUsize,
    pub idle: AtomicUsize,
    pub stopped: AtomicUsize,
}

impl Counters {
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.alive.load(Ordering::Acquire),
            self.idle.load(Ordering::Acquire),
            self.stopped.load(Ordering::Acquire),
        )
    }
}

pub struct WorkerTable {
    pub workers: Vec<WorkerRecord>,
    pub counters: Counters,
}

impl WorkerTable {
    pub fn new(pids: impl IntoIterator<Item = Pid>) -> Self {
        let workers = pids
            .into_iter()
            .enumerate()
            .map(|(id, pid)| WorkerRecord::new(id, pid))
            .collect();
        WorkerTable {
            workers,
            counters: Counters::default(),
        }
    }

    pub fn find_by_pid_mut(&mut self, pid: Pid) -> Option<&mut WorkerRecord> {
        self.workers.iter_mut().find(|w| w.pid == pid)
    }

    /// Apply a raw child-status event to the record matching `pid`. Returns the
    /// `(old, new)` states on success, or an error if the pid is unknown or the
    /// transition is illegal from the record's current state — both are fatal
    /// bookkeeping bugs per the design (§4.3, §7).
    pub fn apply_event(&mut self, pid: Pid, event: ChildEvent) -> anyhow::Result<(WorkerState, WorkerState)> {
        let record = self
            .find_by_pid_mut(pid)
            .ok_or_else(|| anyhow::anyhow!("reconciler observed unknown pid {pid}"))?;
        let old = record.state;
        let new = old
            .on_child_event(event)
            .ok_or_else(|| anyhow::anyhow!("illegal transition for pid {pid}: {old} + {event:?}"))?;
        record.set_state(new);
        self.adjust_counters(old, new);
        Ok((old, new))
    }

    /// The drain phase's synchronous `Stopped -> Idle` recycle, once the master has
    /// consumed (or failed to find) the worker's result.
    pub fn drain(&mut self, id: usize) -> anyhow::Result<()> {
        let record = &mut self.workers[id];
        let old = record.state;
        let new = old
            .on_drained()
            .ok_or_else(|| anyhow::anyhow!("worker {id} drained while in state {old}"))?;
        record.set_state(new);
        record.clear_assignment();
        self.adjust_counters(old, new);
        Ok(())
    }

    fn adjust_counters(&self, old: WorkerState, new: WorkerState) {
        use WorkerState::*;
        if matches!(old, Idle) {
            self.counters.idle.fetch_sub(1, Ordering::AcqRel);
        }
        if matches!(old, Stopped) {
            self.counters.stopped.fetch_sub(1, Ordering::AcqRel);
        }
        if matches!(new, Idle) {
            self.counters.idle.fetch_add(1, Ordering::AcqRel);
        }
        if matches!(new, Stopped) {
            self.counters.stopped.fetch_add(1, Ordering::AcqRel);
        }
        if matches!(old, Started) && matches!(new, Idle) {
            self.counters.alive.fetch_add(1, Ordering::AcqRel);
        }
        if matches!(new, Exited | Aborted) {
            self.counters.alive.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Called by the dispatcher when it moves a worker out of `Idle` into
    /// `Continued` directly (not via [`apply_event`](Self::apply_event), since
    /// that transition is the master's own bookkeeping, not a child-status
    /// event). Keeps the idle counter honest without a fake event round-trip.
    pub fn leave_idle(&self, old: WorkerState) {
        if matches!(old, WorkerState::Idle) {
            self.counters.idle.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn all_idle(&self) -> bool {
        self.workers.iter().all(|w| w.state == WorkerState::Idle)
    }

    pub fn any_stopped(&self) -> bool {
        self.workers.iter().any(|w| w.state == WorkerState::Stopped)
    }

    pub fn all_exited(&self) -> bool {
        self.workers.iter().all(|w| w.state == WorkerState::Exited)
    }

    pub fn any_aborted(&self) -> bool {
        self.workers.iter().any(|w| w.state == WorkerState::Aborted)
    }
}
