//! The production [`WorkerControl`]: real child processes connected by
//! anonymous pipes, driven by job-control signals and a blocking [`SignalFd`]
//! wait for `SIGCHLD`. The fork/pipe/dup2/exec sequence wires each child's
//! stdin/stdout to a fresh pipe pair using `nix` wrappers instead of
//! hand-rolled `libc` FFI.

use crate::control::{ChildStatusEvent, WorkerControl};
use crate::record::WorkerTable;
use crate::state::ChildEvent;
use anyhow::{Context, Result};
use nix::sys::signal::{self, SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use polya_base::{read_frame, write_frame, Frame, Problem, ResultRecord};
use std::ffi::CString;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

struct WorkerPipes {
    down_write: File,
    up_read: File,
}

/// Drives a pool of already-forked `polya-worker` children over their pipes
/// and the process's `SIGCHLD` stream.
pub struct ProcessControl {
    pipes: Vec<WorkerPipes>,
    signal_fd: SignalFd,
}

/// Fork and exec `worker_binary` `count` times. Each child's stdin becomes a
/// fresh down_pipe's read end and its stdout a fresh up_pipe's write end,
/// exactly as the source wires `parToWor`/`worToPar` with `dup2` before
/// `execl`. `SIGCHLD` is blocked process-wide and redirected to a `SignalFd`
/// before the first child is spawned, so no status change between fork and
/// the first wait can be missed; `SIGHUP`/`SIGCONT`/`SIGTERM` are blocked
/// alongside it so a stray delivery of one of the master's own
/// child-control signals can't stop, resume, or kill the master itself.
pub fn spawn_workers(count: u32, worker_binary: &Path) -> Result<(WorkerTable, ProcessControl)> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    mask.add(Signal::SIGHUP);
    mask.add(Signal::SIGCONT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()
        .context("blocking SIGCHLD/SIGHUP/SIGCONT/SIGTERM")?;
    let signal_fd =
        SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC).context("creating signalfd for SIGCHLD")?;

    let program = CString::new(worker_binary.to_string_lossy().into_owned())
        .context("worker binary path contains a NUL byte")?;
    let argv = [program.clone()];

    let mut pids = Vec::with_capacity(count as usize);
    let mut pipes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (down_read, down_write) = unistd::pipe().context("creating down_pipe")?;
        let (up_read, up_write) = unistd::pipe().context("creating up_pipe")?;

        // Safety: the child immediately execs or exits without touching any
        // lock the parent might have held at fork time.
        match unsafe { unistd::fork() }.context("forking worker")? {
            ForkResult::Child => {
                // The blocked-signal mask survives fork and exec; the worker
                // needs SIGHUP/SIGCONT/SIGTERM delivered to it, so undo the
                // master's mask before handing off.
                let _ = SigSet::empty().thread_set_mask();
                let _ = unistd::dup2(down_read.as_raw_fd(), 0);
                let _ = unistd::dup2(up_write.as_raw_fd(), 1);
                drop(down_read);
                drop(down_write);
                drop(up_read);
                drop(up_write);
                let _ = unistd::execv(&program, &argv);
                // execv only returns on failure.
                std::process::exit(127);
            }
            ForkResult::Parent { child } => {
                drop(down_read);
                drop(up_write);
                pids.push(child);
                pipes.push(WorkerPipes {
                    down_write: File::from(down_write),
                    up_read: File::from(up_read),
                });
            }
        }
    }

    Ok((WorkerTable::new(pids), ProcessControl { pipes, signal_fd }))
}

impl WorkerControl for ProcessControl {
    fn write_problem(&mut self, worker_id: usize, problem: &Problem) -> Result<()> {
        write_frame(&mut self.pipes[worker_id].down_write, problem).context("writing problem to down_pipe")
    }

    fn read_result(&mut self, worker_id: usize) -> Result<Frame<ResultRecord>> {
        read_frame(&mut self.pipes[worker_id].up_read).context("reading result from up_pipe")
    }

    fn signal_continue(&mut self, pid: Pid) -> Result<()> {
        signal::kill(pid, Signal::SIGCONT).context("sending SIGCONT")
    }

    fn signal_cancel(&mut self, pid: Pid) -> Result<()> {
        signal::kill(pid, Signal::SIGHUP).context("sending SIGHUP")
    }

    fn signal_terminate(&mut self, pid: Pid) -> Result<()> {
        signal::kill(pid, Signal::SIGTERM).context("sending SIGTERM")
    }

    /// Block on the signalfd for the next `SIGCHLD`, then drain every pending
    /// child-status change non-blockingly with `waitid`.
    fn wait_for_child_events(&mut self) -> Result<Vec<ChildStatusEvent>> {
        self.signal_fd
            .read_signal()
            .context("reading signalfd")?
            .context("signalfd closed unexpectedly")?;

        let mut events = Vec::new();
        loop {
            let flags =
                WaitPidFlag::WNOHANG | WaitPidFlag::WEXITED | WaitPidFlag::WSTOPPED | WaitPidFlag::WCONTINUED;
            match waitid(Id::All, flags) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(WaitStatus::Exited(pid, _)) => {
                    events.push(ChildStatusEvent { pid, kind: ChildEvent::Exited });
                }
                Ok(WaitStatus::Signaled(pid, _, _)) => {
                    events.push(ChildStatusEvent { pid, kind: ChildEvent::Signaled });
                }
                Ok(WaitStatus::Stopped(pid, _)) => {
                    events.push(ChildStatusEvent { pid, kind: ChildEvent::Stopped });
                }
                Ok(WaitStatus::Continued(pid)) => {
                    events.push(ChildStatusEvent { pid, kind: ChildEvent::Continued });
                }
                Ok(_) => continue,
                Err(nix::errno::Errno::ECHILD) => break,
                Err(err) => return Err(err).context("waitid"),
            }
        }
        Ok(events)
    }
}
