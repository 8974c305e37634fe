//! The race-to-first-success dispatcher: phase A (drain) and phase B (dispatch)
//! alternate until the problem source is exhausted, at which point shutdown
//! begins.

use crate::collaborators::{ProblemSource, ResultSink};
use crate::control::WorkerControl;
use crate::instrumentation::Instrumentation;
use crate::record::WorkerTable;
use crate::state::WorkerState;
use nix::unistd::Pid;
use polya_base::Frame;

enum DispatchOutcome {
    Dispatched,
    Shutdown,
}

pub struct Dispatcher<C, PS, RS, I> {
    pub table: WorkerTable,
    control: C,
    problems: PS,
    sink: RS,
    instrumentation: I,
    /// Cleared at the start of each batch; set the moment a worker's success is
    /// accepted. Checked and set only here, in the main loop — never from signal
    /// delivery — so it needs no synchronization.
    batch_resolved: bool,
}

impl<C, PS, RS, I> Dispatcher<C, PS, RS, I>
where
    C: WorkerControl,
    PS: ProblemSource,
    RS: ResultSink,
    I: Instrumentation,
{
    pub fn new(table: WorkerTable, control: C, problems: PS, sink: RS, instrumentation: I) -> Self {
        Dispatcher {
            table,
            control,
            problems,
            sink,
            instrumentation,
            batch_resolved: true,
        }
    }

    /// Run until the problem source is exhausted and every worker has exited, or
    /// until a worker aborts (fatal).
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.instrumentation.sf_start();
        loop {
            self.drain_phase()?;
            if self.table.any_aborted() {
                anyhow::bail!("a worker was killed or exited abnormally");
            }
            match self.dispatch_phase()? {
                DispatchOutcome::Dispatched => continue,
                DispatchOutcome::Shutdown => break,
            }
        }
        self.shutdown()?;
        self.instrumentation.sf_end();
        Ok(())
    }

    /// Phase A: run while any worker is not IDLE.
    fn drain_phase(&mut self) -> anyhow::Result<()> {
        while !self.table.all_idle() {
            if self.table.any_aborted() {
                return Ok(());
            }
            if !self.table.any_stopped() {
                self.reconcile()?;
                continue;
            }
            self.drain_stopped_once()?;
        }
        Ok(())
    }

    fn drain_stopped_once(&mut self) -> anyhow::Result<()> {
        let stopped_ids: Vec<usize> = self
            .table
            .workers
            .iter()
            .filter(|w| w.state == WorkerState::Stopped)
            .map(|w| w.id)
            .collect();
        for id in stopped_ids {
            if self.table.workers[id].drained {
                self.table.drain(id)?;
                continue;
            }
            let frame = self.control.read_result(id)?;
            self.table.workers[id].drained = true;
            match frame {
                Frame::Short => {
                    // Cancelled before writing anything: no result to receive.
                    self.table.drain(id)?;
                }
                Frame::Complete(result) => {
                    let pid = self.table.workers[id].pid;
                    self.instrumentation.sf_recv_result(pid, &result);
                    if !result.is_failed() && !self.batch_resolved {
                        self.batch_resolved = true;
                        let problem = self.table.workers[id]
                            .assigned
                            .clone()
                            .expect("a stopped worker with a result must have an assigned problem");
                        self.sink.post_result(result, problem);
                        self.cancel_siblings(id)?;
                    }
                    // A failed result, or a second success in the same walk, is
                    // simply discarded.
                    self.table.drain(id)?;
                }
            }
        }
        Ok(())
    }

    fn cancel_siblings(&mut self, winner_id: usize) -> anyhow::Result<()> {
        let ids: Vec<usize> = self
            .table
            .workers
            .iter()
            .filter(|w| w.id != winner_id && matches!(w.state, WorkerState::Continued | WorkerState::Running))
            .map(|w| w.id)
            .collect();
        for id in ids {
            let pid = self.table.workers[id].pid;
            self.instrumentation.sf_cancel(pid);
            self.control.signal_cancel(pid)?;
        }
        Ok(())
    }

    /// Phase B: entered once every worker is IDLE.
    fn dispatch_phase(&mut self) -> anyhow::Result<DispatchOutcome> {
        let nvariants = self.table.workers.len() as u32;
        let mut problems = Vec::with_capacity(nvariants as usize);
        for i in 0..nvariants {
            match self.problems.next_variant(nvariants, i) {
                Some(p) => problems.push(p),
                None => return Ok(DispatchOutcome::Shutdown),
            }
        }

        self.batch_resolved = false;
        for (i, problem) in problems.into_iter().enumerate() {
            let pid = self.table.workers[i].pid;
            self.instrumentation.sf_send_problem(pid, &problem);
            let old = self.table.workers[i].state;
            self.table.workers[i].state = WorkerState::Continued;
            self.table.leave_idle(old);
            self.instrumentation.sf_change_state(pid, old, WorkerState::Continued);
            self.table.workers[i].assign(problem.clone());
            self.control.write_problem(i, &problem)?;
            self.control.signal_continue(pid)?;
        }
        Ok(DispatchOutcome::Dispatched)
    }

    fn reconcile(&mut self) -> anyhow::Result<()> {
        let events = self.control.wait_for_child_events()?;
        for event in events {
            let (old, new) = self.table.apply_event(event.pid, event.kind)?;
            self.instrumentation.sf_change_state(event.pid, old, new);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        let pids: Vec<Pid> = self.table.workers.iter().map(|w| w.pid).collect();
        for pid in pids {
            self.control.signal_continue(pid)?;
            self.control.signal_terminate(pid)?;
        }
        while !self.table.all_exited() {
            if self.table.any_aborted() {
                anyhow::bail!("a worker aborted during shutdown");
            }
            self.reconcile()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ChildStatusEvent;
    use crate::instrumentation::Instrumentation;
    use crate::state::ChildEvent;
    use polya_base::ResultRecord;
    use std::collections::{HashMap, VecDeque};

    /// Drives the dispatcher through a pre-scripted sequence of child-status
    /// events and pre-loaded up_pipe results, standing in for real subprocesses.
    #[derive(Default)]
    struct FakeControl {
        events: VecDeque<Vec<ChildStatusEvent>>,
        /// One queue per worker id; each read_result pops the next scheduled
        /// frame for that id, so a worker's result can differ batch to batch.
        results: HashMap<usize, VecDeque<Frame<ResultRecord>>>,
        written: Vec<(usize, Problem)>,
        signals: Vec<(Pid, &'static str)>,
    }

    impl FakeControl {
        fn push_events(&mut self, events: Vec<(Pid, ChildEvent)>) {
            self.events.push_back(
                events
                    .into_iter()
                    .map(|(pid, kind)| ChildStatusEvent { pid, kind })
                    .collect(),
            );
        }

        fn set_result(&mut self, id: usize, frame: Frame<ResultRecord>) {
            self.results.entry(id).or_default().push_back(frame);
        }
    }

    impl WorkerControl for FakeControl {
        fn write_problem(&mut self, worker_id: usize, problem: &Problem) -> anyhow::Result<()> {
            self.written.push((worker_id, problem.clone()));
            Ok(())
        }

        fn read_result(&mut self, worker_id: usize) -> anyhow::Result<Frame<ResultRecord>> {
            Ok(self
                .results
                .get_mut(&worker_id)
                .and_then(|q| q.pop_front())
                .unwrap_or(Frame::Short))
        }

        fn signal_continue(&mut self, pid: Pid) -> anyhow::Result<()> {
            self.signals.push((pid, "continue"));
            Ok(())
        }

        fn signal_cancel(&mut self, pid: Pid) -> anyhow::Result<()> {
            self.signals.push((pid, "cancel"));
            Ok(())
        }

        fn signal_terminate(&mut self, pid: Pid) -> anyhow::Result<()> {
            self.signals.push((pid, "terminate"));
            Ok(())
        }

        fn wait_for_child_events(&mut self) -> anyhow::Result<Vec<ChildStatusEvent>> {
            self.events
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("test script ran out of scripted child events"))
        }
    }

    #[derive(Default)]
    struct ScriptedProblems {
        batches: VecDeque<Vec<Problem>>,
        current: Option<std::vec::IntoIter<Problem>>,
    }

    impl ScriptedProblems {
        fn with_batches(batches: Vec<Vec<Problem>>) -> Self {
            ScriptedProblems {
                batches: batches.into(),
                current: None,
            }
        }
    }

    impl ProblemSource for ScriptedProblems {
        fn next_variant(&mut self, _nvariants: u32, i: u32) -> Option<Problem> {
            if i == 0 {
                self.current = self.batches.pop_front().map(|batch| batch.into_iter());
            }
            self.current.as_mut().and_then(|it| it.next())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        posted: Vec<(ResultRecord, Problem)>,
    }

    impl ResultSink for RecordingSink {
        fn post_result(&mut self, result: ResultRecord, problem: Problem) {
            self.posted.push((result, problem));
        }
    }

    #[derive(Default)]
    struct RecordingInstrumentation {
        started: bool,
        ended: bool,
        recv_result_calls: Vec<Pid>,
        cancel_calls: Vec<Pid>,
    }

    impl Instrumentation for RecordingInstrumentation {
        fn sf_start(&mut self) {
            self.started = true;
        }
        fn sf_end(&mut self) {
            self.ended = true;
        }
        fn sf_recv_result(&mut self, pid: Pid, _result: &ResultRecord) {
            self.recv_result_calls.push(pid);
        }
        fn sf_cancel(&mut self, pid: Pid) {
            self.cancel_calls.push(pid);
        }
    }

    fn pids(n: i32) -> Vec<Pid> {
        (1..=n).map(Pid::from_raw).collect()
    }

    fn ready_events(ps: &[Pid]) -> Vec<(Pid, ChildEvent)> {
        ps.iter().map(|&p| (p, ChildEvent::Stopped)).collect()
    }

    fn continued_events(ps: &[Pid]) -> Vec<(Pid, ChildEvent)> {
        ps.iter().map(|&p| (p, ChildEvent::Continued)).collect()
    }

    fn exited_events(ps: &[Pid]) -> Vec<(Pid, ChildEvent)> {
        ps.iter().map(|&p| (p, ChildEvent::Exited)).collect()
    }

    fn one_batch(ps: &[Pid]) -> Vec<Problem> {
        ps.iter()
            .enumerate()
            .map(|(i, _)| Problem::new(0, i as u32, ps.len() as u32, vec![i as u8]))
            .collect()
    }

    #[test]
    fn happy_race_accepts_first_success_and_cancels_the_rest() {
        let ps = pids(3);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[0], ChildEvent::Stopped)]);
        control.push_events(vec![(ps[1], ChildEvent::Stopped), (ps[2], ChildEvent::Stopped)]);
        control.push_events(exited_events(&ps));
        control.set_result(0, Frame::Complete(ResultRecord::success(vec![0x41])));
        control.set_result(1, Frame::Complete(ResultRecord::failed()));
        control.set_result(2, Frame::Complete(ResultRecord::failed()));

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![one_batch(&ps)]);
        let sink = RecordingSink::default();
        let instrumentation = RecordingInstrumentation::default();
        let mut dispatcher = Dispatcher::new(table, control, problems, sink, instrumentation);

        dispatcher.run().unwrap();

        assert_eq!(dispatcher.sink.posted.len(), 1);
        assert_eq!(dispatcher.sink.posted[0].0.data[0], 0x41);
        assert_eq!(dispatcher.sink.posted[0].1.variant(), 0);
        assert!(dispatcher.instrumentation.started);
        assert!(dispatcher.instrumentation.ended);
        assert_eq!(dispatcher.instrumentation.cancel_calls, vec![ps[1], ps[2]]);
        assert!(dispatcher.table.all_exited());
    }

    #[test]
    fn all_fail_does_not_post_a_result() {
        let ps = pids(2);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[0], ChildEvent::Stopped), (ps[1], ChildEvent::Stopped)]);
        control.push_events(exited_events(&ps));
        control.set_result(0, Frame::Complete(ResultRecord::failed()));
        control.set_result(1, Frame::Complete(ResultRecord::failed()));

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![one_batch(&ps)]);
        let mut dispatcher = Dispatcher::new(
            table,
            control,
            problems,
            RecordingSink::default(),
            RecordingInstrumentation::default(),
        );

        dispatcher.run().unwrap();

        assert!(dispatcher.sink.posted.is_empty());
        assert!(dispatcher.table.all_exited());
    }

    #[test]
    fn no_variants_shuts_down_immediately() {
        let ps = pids(2);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        control.push_events(exited_events(&ps));

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![]);
        let mut dispatcher = Dispatcher::new(
            table,
            control,
            problems,
            RecordingSink::default(),
            RecordingInstrumentation::default(),
        );

        dispatcher.run().unwrap();

        assert!(dispatcher.instrumentation.started);
        assert!(dispatcher.instrumentation.ended);
        assert!(dispatcher.sink.posted.is_empty());
        assert!(dispatcher.table.all_exited());
    }

    #[test]
    fn late_loser_result_is_discarded() {
        let ps = pids(2);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[0], ChildEvent::Stopped)]);
        control.push_events(vec![(ps[1], ChildEvent::Stopped)]);
        control.push_events(exited_events(&ps));
        control.set_result(0, Frame::Complete(ResultRecord::success(vec![0x01])));
        // The loser ignores the cancel hint and succeeds anyway, late.
        control.set_result(1, Frame::Complete(ResultRecord::success(vec![0x02])));

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![one_batch(&ps)]);
        let mut dispatcher = Dispatcher::new(
            table,
            control,
            problems,
            RecordingSink::default(),
            RecordingInstrumentation::default(),
        );

        dispatcher.run().unwrap();

        assert_eq!(dispatcher.sink.posted.len(), 1);
        assert_eq!(dispatcher.sink.posted[0].0.data[0], 0x01);
        assert!(dispatcher.table.all_exited());
    }

    #[test]
    fn second_batch_is_dispatched_in_assigned_order_after_a_win() {
        let ps = pids(2);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        // Batch 1: worker 0 wins immediately.
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[0], ChildEvent::Stopped), (ps[1], ChildEvent::Stopped)]);
        control.set_result(0, Frame::Complete(ResultRecord::success(vec![0xaa])));
        control.set_result(1, Frame::Complete(ResultRecord::failed()));
        // Batch 2: worker 1 wins this time. Each id's results queue is drained in
        // the order they're staged here, so these are simply the second entry for
        // each id — no need to wait for batch 1 to actually run first.
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[1], ChildEvent::Stopped), (ps[0], ChildEvent::Stopped)]);
        control.push_events(exited_events(&ps));
        control.set_result(0, Frame::Complete(ResultRecord::failed()));
        control.set_result(1, Frame::Complete(ResultRecord::success(vec![0xbb])));

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![one_batch(&ps), one_batch(&ps)]);
        let mut dispatcher = Dispatcher::new(
            table,
            control,
            problems,
            RecordingSink::default(),
            RecordingInstrumentation::default(),
        );

        dispatcher.run().unwrap();

        assert_eq!(dispatcher.sink.posted.len(), 2);
        assert_eq!(dispatcher.sink.posted[0].0.data[0], 0xaa);
        assert_eq!(dispatcher.sink.posted[1].0.data[0], 0xbb);
        // Two problems written per worker per batch, in ascending worker-id order
        // within each batch.
        let ids: Vec<usize> = dispatcher.control.written.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 0, 1]);
    }

    #[test]
    fn short_read_drains_without_posting_or_recv_hook() {
        let ps = pids(1);
        let mut control = FakeControl::default();
        control.push_events(ready_events(&ps));
        control.push_events(continued_events(&ps));
        control.push_events(vec![(ps[0], ChildEvent::Stopped)]);
        control.push_events(exited_events(&ps));
        // No result staged for worker 0: read_result will return Frame::Short, as
        // if the worker were cancelled before writing a single byte.

        let table = WorkerTable::new(ps.iter().copied());
        let problems = ScriptedProblems::with_batches(vec![one_batch(&ps)]);
        let mut dispatcher = Dispatcher::new(
            table,
            control,
            problems,
            RecordingSink::default(),
            RecordingInstrumentation::default(),
        );

        dispatcher.run().unwrap();

        assert!(dispatcher.sink.posted.is_empty());
        assert!(dispatcher.instrumentation.recv_result_calls.is_empty());
        assert!(dispatcher.table.all_exited());
    }
}
