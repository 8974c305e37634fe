//! The per-problem solver registry dispatched by `problem.type` inside the worker.
//!
//! Solvers are opaque pure functions parameterized by a cancellation flag, from the
//! master/worker core's point of view — the registry and the solvers under
//! [`examples`] are a demonstration/test fixture, not production solving logic.

pub mod examples;

use polya_base::{Problem, ResultRecord};
use std::sync::atomic::AtomicBool;

/// One entry in the solver table, keyed by `Problem::type`.
pub trait Solver: Send + Sync {
    /// Attempt to solve `problem`. Long-running solvers should poll `cancel`
    /// periodically and return `None` promptly once it is set. `None` means
    /// "cancelled or failed without output"; the worker synthesizes a `failed=1`
    /// stub in that case.
    fn solve(&self, problem: &Problem, cancel: &AtomicBool) -> Option<ResultRecord>;
}

/// A fixed mapping from `problem.type` to [`Solver`], mirroring the source's
/// `solvers[type].solve` table.
#[derive(Default)]
pub struct Registry {
    solvers: Vec<Box<dyn Solver>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(mut self, solver: impl Solver + 'static) -> Self {
        self.solvers.push(Box::new(solver));
        self
    }

    pub fn solve(&self, problem: &Problem, cancel: &AtomicBool) -> Option<ResultRecord> {
        self.solvers
            .get(problem.r#type() as usize)
            .and_then(|solver| solver.solve(problem, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::examples::EchoSolver;

    #[test]
    fn unregistered_type_yields_none() {
        let registry = Registry::new().register(EchoSolver);
        let problem = Problem::new(7, 0, 1, vec![1, 2, 3]);
        let cancel = AtomicBool::new(false);
        assert!(registry.solve(&problem, &cancel).is_none());
    }

    #[test]
    fn dispatches_by_type() {
        let registry = Registry::new().register(EchoSolver);
        let problem = Problem::new(0, 0, 1, vec![9, 9]);
        let cancel = AtomicBool::new(false);
        let result = registry.solve(&problem, &cancel).unwrap();
        assert!(!result.is_failed());
        assert_eq!(&result.data[..2], &[9, 9]);
    }
}
