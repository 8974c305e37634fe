//! The worker lifecycle state machine (see the module-level docs in
//! [`crate::record`] for the surrounding invariants).
//!
//! Two distinct reasons a child may be stopped are distinguished purely by the
//! *prior* state: a stop from `Started` means "worker is ready for its first
//! problem" (`-> Idle`), a stop from `Running` means "worker has a result on its
//! up_pipe" (`-> Stopped`).

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Started,
    Idle,
    Continued,
    Running,
    Stopped,
    Exited,
    Aborted,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Started => "STARTED",
            WorkerState::Idle => "IDLE",
            WorkerState::Continued => "CONTINUED",
            WorkerState::Running => "RUNNING",
            WorkerState::Stopped => "STOPPED",
            WorkerState::Exited => "EXITED",
            WorkerState::Aborted => "ABORTED",
        };
        write!(f, "{s}")
    }
}

/// A raw child-status event, as produced by `waitid(2)` and classified by the
/// reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildEvent {
    Stopped,
    Continued,
    Exited,
    Signaled,
}

impl WorkerState {
    /// Apply a child-status event to the current state, returning the new state,
    /// or `None` if this event is illegal from this state (the reconciler treats
    /// that as a fatal bookkeeping bug, same as an unknown pid).
    pub fn on_child_event(self, event: ChildEvent) -> Option<WorkerState> {
        use ChildEvent::*;
        use WorkerState::*;
        match (self, event) {
            (_, Exited) => Some(Exited),
            (_, Signaled) => Some(Aborted),
            (Started, Stopped) => Some(Idle),
            (Running, Stopped) => Some(Stopped),
            (Continued, Continued) | (Idle, Continued) => Some(Running),
            _ => None,
        }
    }

    /// The drain phase's synchronous `Stopped -> Idle` transition, taken once the
    /// master has read (or failed to read) the worker's result. Not driven by a
    /// child-status event at all, hence not part of [`on_child_event`].
    pub fn on_drained(self) -> Option<WorkerState> {
        match self {
            WorkerState::Stopped => Some(WorkerState::Idle),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Exited | WorkerState::Aborted)
    }
}
