//! The worker binary: reads one problem from stdin, solves it (cancellably),
//! writes one result to stdout, then suspends itself and waits for the next
//! assignment.

mod flags;

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigAction, SigHandler, SaFlags, SigSet, Signal};
use polya_base::{read_frame, write_frame, Frame, Problem, ResultRecord};
use polya_solvers::examples::{CancellableSleepSolver, EchoSolver, StubbornSleepSolver};
use polya_solvers::Registry;
use std::io::{self, BufReader, BufWriter};

/// The demonstration registry this binary ships with — illustrative solvers
/// only; solver functions are an opaque, pluggable collaborator.
fn default_registry() -> Registry {
    Registry::new()
        .register(EchoSolver)
        .register(CancellableSleepSolver::default())
        .register(StubbornSleepSolver)
}

fn install_handlers() -> Result<()> {
    let empty_mask = SigSet::empty();
    unsafe {
        signal::sigaction(
            Signal::SIGHUP,
            &SigAction::new(SigHandler::Handler(flags::on_sighup), SaFlags::empty(), empty_mask),
        )
        .context("installing SIGHUP handler")?;
        signal::sigaction(
            Signal::SIGCONT,
            &SigAction::new(SigHandler::Handler(flags::on_sigcont), SaFlags::empty(), empty_mask),
        )
        .context("installing SIGCONT handler")?;
        signal::sigaction(
            Signal::SIGTERM,
            &SigAction::new(SigHandler::Handler(flags::on_sigterm), SaFlags::empty(), empty_mask),
        )
        .context("installing SIGTERM handler")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    install_handlers()?;
    let registry = default_registry();
    let mut stdin = BufReader::new(io::stdin());
    let mut stdout = BufWriter::new(io::stdout());

    loop {
        signal::raise(Signal::SIGSTOP).context("raising SIGSTOP")?;
        if !flags::take_proceed() {
            // Woken by something other than a genuine continue (e.g. a stray
            // SIGCONT delivered twice); go back to sleep.
            continue;
        }

        let problem: Problem = match read_frame(&mut stdin).context("reading problem")? {
            Frame::Complete(p) => p,
            Frame::Short => {
                // down_pipe closed before a header arrived: nothing to solve.
                flags::clear_cancel();
                continue;
            }
        };

        let result = registry
            .solve(&problem, &flags::CANCEL)
            .unwrap_or_else(ResultRecord::failed);
        write_frame(&mut stdout, &result).context("writing result")?;
        flags::clear_cancel();
    }
}
