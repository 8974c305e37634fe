//! The length-prefixed binary wire protocol shared by the master and the worker.
//!
//! Both [`Problem`] and [`ResultRecord`] are a fixed `#[repr(C)]` header (a
//! [`zerocopy`]-derived POD struct) followed by an opaque payload whose length is
//! carried in the header's `size` field. `size` always counts the header itself and
//! is aligned to [`ALIGNMENT`] bytes.

use anyhow::Context as _;
use std::io::{Read, Write};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const ALIGNMENT: u32 = 16;

pub fn align_up(n: u32) -> u32 {
    (n + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct ProblemHeader {
    pub size: u32,
    pub r#type: u32,
    pub variant: u32,
    pub nvariants: u32,
}

/// One of `nvariants` parameterizations of the same logical problem, dispatched to
/// exactly one worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Problem {
    pub header: ProblemHeader,
    pub data: Vec<u8>,
}

impl Problem {
    pub fn new(r#type: u32, variant: u32, nvariants: u32, mut data: Vec<u8>) -> Self {
        let header_len = std::mem::size_of::<ProblemHeader>() as u32;
        let size = align_up(header_len + data.len() as u32);
        data.resize((size - header_len) as usize, 0);
        Problem {
            header: ProblemHeader {
                size,
                r#type,
                variant,
                nvariants,
            },
            data,
        }
    }

    pub fn r#type(&self) -> u32 {
        self.header.r#type
    }

    pub fn variant(&self) -> u32 {
        self.header.variant
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct ResultHeader {
    pub size: u32,
    pub failed: u32,
}

/// A solver's output, or a `failed=1` stub synthesized when the solver produced
/// nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultRecord {
    pub header: ResultHeader,
    pub data: Vec<u8>,
}

impl ResultRecord {
    pub fn success(mut data: Vec<u8>) -> Self {
        let header_len = std::mem::size_of::<ResultHeader>() as u32;
        let size = align_up(header_len + data.len() as u32);
        data.resize((size - header_len) as usize, 0);
        ResultRecord {
            header: ResultHeader { size, failed: 0 },
            data,
        }
    }

    /// The stub the worker writes when the solver returns nothing: "gave up, no
    /// output".
    pub fn failed() -> Self {
        ResultRecord {
            header: ResultHeader {
                size: std::mem::size_of::<ResultHeader>() as u32,
                failed: 1,
            },
            data: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.header.failed != 0
    }
}

/// The outcome of [`read_frame`]: either a complete record, or `Short`, meaning EOF
/// arrived before even the header was complete. `Short` is not an error — it's how a
/// stopped worker that produced no output on its up_pipe is recognized.
#[derive(Debug)]
pub enum Frame<T> {
    Complete(T),
    Short,
}

impl<T> Frame<T> {
    pub fn complete(self) -> Option<T> {
        match self {
            Frame::Complete(v) => Some(v),
            Frame::Short => None,
        }
    }
}

/// A wire record: a POD header plus an opaque payload whose length the header
/// carries.
pub trait WireRecord: Sized {
    type Header: AsBytes + FromBytes + FromZeroes + Copy;
    fn header(&self) -> Self::Header;
    fn data(&self) -> &[u8];
    fn header_size(header: &Self::Header) -> u32;
    fn from_parts(header: Self::Header, data: Vec<u8>) -> Self;
}

impl WireRecord for Problem {
    type Header = ProblemHeader;
    fn header(&self) -> ProblemHeader {
        self.header
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn header_size(header: &ProblemHeader) -> u32 {
        header.size
    }
    fn from_parts(header: ProblemHeader, data: Vec<u8>) -> Self {
        Problem { header, data }
    }
}

impl WireRecord for ResultRecord {
    type Header = ResultHeader;
    fn header(&self) -> ResultHeader {
        self.header
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn header_size(header: &ResultHeader) -> u32 {
        header.size
    }
    fn from_parts(header: ResultHeader, data: Vec<u8>) -> Self {
        ResultRecord { header, data }
    }
}

/// Write the header, then the payload, then flush — one atomic stream, no trailing
/// delimiter. `size` is self-describing.
pub fn write_frame<R: WireRecord>(w: &mut impl Write, msg: &R) -> anyhow::Result<()> {
    w.write_all(msg.header().as_bytes())
        .context("writing frame header")?;
    w.write_all(msg.data()).context("writing frame payload")?;
    w.flush().context("flushing frame")?;
    Ok(())
}

/// Read a complete frame, or [`Frame::Short`] if EOF arrives before the header is
/// complete.
///
/// A short read *after* a complete header — the payload truncated mid-write by a
/// cancelled peer — is tolerated: the missing tail is left zero-filled.
pub fn read_frame<R: WireRecord>(r: &mut impl Read) -> anyhow::Result<Frame<R>> {
    let mut header = R::Header::new_zeroed();
    let header_len = std::mem::size_of::<R::Header>();
    let mut filled = 0usize;
    {
        let buf = header.as_bytes_mut();
        while filled < header_len {
            let n = r.read(&mut buf[filled..]).context("reading frame header")?;
            if n == 0 {
                break;
            }
            filled += n;
        }
    }
    if filled < header_len {
        return Ok(Frame::Short);
    }
    let total = R::header_size(&header);
    let payload_len = total.saturating_sub(header_len as u32) as usize;
    let mut data = vec![0u8; payload_len];
    let mut got = 0usize;
    while got < payload_len {
        let n = r.read(&mut data[got..]).context("reading frame payload")?;
        if n == 0 {
            break;
        }
        got += n;
    }
    // data[got..] stays zero when the writer was cancelled mid-payload.
    Ok(Frame::Complete(R::from_parts(header, data)))
}
