//! The master half of the `polya` parallel problem-solving coordinator:
//! worker-record bookkeeping, the lifecycle state machine, the signal
//! reconciler, and the race-to-first-success dispatcher. The core is generic
//! over small collaborator traits so the dispatch logic can be exercised
//! without real subprocesses.

pub mod collaborators;
pub mod control;
pub mod dispatch;
pub mod instrumentation;
pub mod record;
pub mod spawn;
pub mod state;

pub use collaborators::{ProblemSource, ResultSink};
pub use control::{ChildStatusEvent, WorkerControl};
pub use dispatch::Dispatcher;
pub use instrumentation::{Instrumentation, NullInstrumentation, SlogInstrumentation};
pub use record::{Counters, WorkerRecord, WorkerTable};
pub use spawn::{spawn_workers, ProcessControl};
pub use state::{ChildEvent, WorkerState};
