//! Buffered byte pipe with holdover discipline for partial matches.
//!
//! A [`Connection`] owns one side of a byte pipe (the shell's stdout, the
//! glob channel, the command channel, ...). Each read cycle prepends any
//! holdover left over from the previous cycle, tracks a `pos`/`seglen`
//! window identifying the segment currently under a matcher's inspection,
//! and offers exactly two ways to consume that window: [`Connection::eat_segment`]
//! (drop it from the buffer — a delimiter being suppressed) and
//! [`Connection::pass_segment`] (step past it, leaving the bytes in place to be
//! written through verbatim).

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use crate::errors::ConnError;

/// Outcome of a single [`Connection::fill`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` new bytes were appended to the buffer.
    Read(usize),
    /// The peer closed the connection (EOF, or EIO on a pty master).
    Exit,
}

/// The four process-wide interpretive modes a connection's matcher runs
/// under. Only meaningful for the shell-output connection; protocol
/// channels always run a single fixed grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLevel {
    Terminal,
    AtPrompt,
    Executing,
    AtRPrompt,
}

/// A buffered byte pipe carrying holdover discipline across independent
/// `read(2)` calls.
pub struct Connection {
    name: String,
    buf: Vec<u8>,
    /// Number of valid bytes at the front of `buf`.
    filled: usize,
    /// Start of the segment currently under inspection.
    pos: usize,
    /// Length of that segment.
    seglen: usize,
    /// Bytes at the front of `buf[..skip]` that were already written out in
    /// a previous pass and must not be written again.
    skip: usize,
    /// Bytes retained from the previous read because a match was still in
    /// progress at end-of-buffer.
    holdover: Option<Vec<u8>>,
    /// Whether `holdover`'s bytes were already emitted downstream before
    /// being retained (vs. deferred, not yet emitted).
    ho_written: bool,
    pub level: ProcessLevel,
}

const DEFAULT_CAPACITY: usize = 4096;

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Connection {
            name: name.into(),
            buf: vec![0u8; DEFAULT_CAPACITY],
            filled: 0,
            pos: 0,
            seglen: 0,
            skip: 0,
            holdover: None,
            ho_written: false,
            level: ProcessLevel::Terminal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes of the segment currently under inspection: `[pos, pos+seglen)`.
    pub fn segment(&self) -> &[u8] {
        &self.buf[self.pos..self.pos + self.seglen]
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn seglen(&self) -> usize {
        self.seglen
    }

    pub fn set_seglen(&mut self, seglen: usize) {
        self.seglen = seglen;
    }

    /// Grow the match-in-progress window by one byte, called once per byte
    /// fed to the matcher.
    pub fn grow_segment(&mut self) {
        self.seglen += 1;
    }

    /// Unconsumed bytes available for matching: `[pos+seglen, filled)`.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos + self.seglen..self.filled]
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos + self.seglen >= self.filled
    }

    /// Step (i) of the read cycle: move any prior holdover to the front of
    /// the buffer, or reset bookkeeping to a clean empty buffer.
    pub fn prepend_holdover(&mut self) {
        match self.holdover.take() {
            Some(ho) => {
                let len = ho.len();
                if self.buf.len() < len {
                    self.buf.resize(len, 0);
                }
                self.buf[..len].copy_from_slice(&ho);
                self.filled = len;
                self.pos = 0;
                self.seglen = 0;
                self.skip = if self.ho_written { len } else { 0 };
            }
            None => {
                self.filled = 0;
                self.pos = 0;
                self.seglen = 0;
                self.skip = 0;
            }
        }
    }

    /// Step (iv): end-of-buffer with a match still in progress. `write_later`
    /// is true when the held-back bytes have *not* yet been written through
    /// (deferred); false when they were already written (written-through).
    pub fn create_holdover(&mut self, write_later: bool) {
        let ho = self.buf[self.pos..self.pos + self.seglen].to_vec();
        if write_later {
            self.filled -= self.seglen;
            self.ho_written = false;
        } else {
            self.ho_written = true;
        }
        self.holdover = Some(ho);
    }

    /// Remove the current segment from the buffer entirely (a suppressed
    /// delimiter). `pos` is left unmoved; bytes after the segment shift down.
    pub fn eat_segment(&mut self) {
        let start = self.pos;
        let end = self.pos + self.seglen;
        self.buf.copy_within(end..self.filled, start);
        self.filled -= self.seglen;
        self.seglen = 0;
    }

    /// Step past the current segment, leaving its bytes in the buffer to be
    /// written through.
    pub fn pass_segment(&mut self) {
        self.pos += self.seglen;
        self.seglen = 0;
    }

    /// Shrink the in-progress segment by `n` bytes from the tail, used by
    /// effect handlers that must not consume a lookahead byte (e.g. the
    /// terminator of `carriage-return-followed-by-non-LF`).
    pub fn shrink_segment(&mut self, n: usize) {
        self.seglen = self.seglen.saturating_sub(n);
    }

    fn ensure_capacity(&mut self, extra: usize) {
        let needed = self.filled + extra;
        if needed > self.buf.len() {
            self.buf.resize(needed.max(self.buf.len() * 2), 0);
        }
    }

    /// Read from `r` into the tail of the buffer. Maps POSIX read semantics:
    /// `Ok(0)` is EOF, mapped to `Exit`; `EIO` is also mapped to `Exit` since
    /// that's how a hung-up pty master reports peer close; any other error
    /// is returned as-is.
    pub fn fill<R: Read>(&mut self, r: &mut R) -> Result<ReadOutcome, ConnError> {
        self.ensure_capacity(DEFAULT_CAPACITY);
        match r.read(&mut self.buf[self.filled..]) {
            Ok(0) => Ok(ReadOutcome::Exit),
            Ok(n) => {
                self.filled += n;
                Ok(ReadOutcome::Read(n))
            }
            Err(e) if e.raw_os_error() == Some(libc_eio()) => Ok(ReadOutcome::Exit),
            Err(e) => Err(ConnError::Io {
                name: self.name.clone(),
                source: e,
            }),
        }
    }

    /// Write-all semantics over `buf[skip..filled]`, retrying short writes.
    pub fn flush_passthrough<W: Write>(&mut self, w: &mut W) -> Result<(), ConnError> {
        let mut off = self.skip;
        while off < self.filled {
            match w.write(&self.buf[off..self.filled]) {
                Ok(0) => {
                    return Err(ConnError::Exit {
                        name: self.name.clone(),
                    })
                }
                Ok(n) => off += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ConnError::Io {
                        name: self.name.clone(),
                        source: e,
                    })
                }
            }
        }
        self.skip = self.filled;
        Ok(())
    }

    pub fn raw_fd<T: AsRawFd>(of: &T) -> RawFd {
        of.as_raw_fd()
    }
}

#[cfg(unix)]
fn libc_eio() -> i32 {
    libc::EIO
}

#[cfg(not(unix))]
fn libc_eio() -> i32 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fill_reads_into_buffer() {
        let mut c = Connection::new("test");
        c.prepend_holdover();
        let mut src = Cursor::new(b"hello".to_vec());
        let outcome = c.fill(&mut src).unwrap();
        match outcome {
            ReadOutcome::Read(5) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(&c.buf[..c.filled], b"hello");
    }

    #[test]
    fn eof_maps_to_exit() {
        let mut c = Connection::new("test");
        c.prepend_holdover();
        let mut src = Cursor::new(Vec::<u8>::new());
        match c.fill(&mut src).unwrap() {
            ReadOutcome::Exit => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn eat_segment_removes_bytes_pass_segment_keeps_them() {
        let mut c = Connection::new("test");
        c.prepend_holdover();
        let mut src = Cursor::new(b"ABCDE".to_vec());
        c.fill(&mut src).unwrap();
        c.set_seglen(2); // "AB" is the segment under inspection
        c.eat_segment();
        assert_eq!(&c.buf[..c.filled], b"CDE");
        assert_eq!(c.pos(), 0);

        c.set_seglen(1); // "C"
        c.pass_segment();
        assert_eq!(c.pos(), 1);
        assert_eq!(&c.buf[..c.filled], b"CDE");
    }

    #[test]
    fn holdover_round_trips_across_reads() {
        let mut c = Connection::new("test");
        c.prepend_holdover();
        let mut src = Cursor::new(b"AB".to_vec());
        c.fill(&mut src).unwrap();
        c.set_seglen(2); // match still in progress at end of buffer
        c.create_holdover(true); // deferred: not yet written
        assert_eq!(c.filled, 0);

        c.prepend_holdover();
        assert_eq!(&c.buf[..c.filled], b"AB");
        assert_eq!(c.pos(), 0);
        assert_eq!(c.skip, 0);
    }
}
