//! Shared wire-format types for the `polya` master/worker pair.
//!
//! Everything here is deliberately free of process, signal, and I/O-scheduling
//! concerns — those live in `polya-master` and `polya-worker`. This crate only
//! knows how to turn a [`Problem`] or [`ResultRecord`] into bytes and back.

pub mod wire;

pub use wire::{
    align_up, read_frame, write_frame, Frame, Problem, ProblemHeader, ResultHeader, ResultRecord,
    WireRecord, ALIGNMENT,
};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
