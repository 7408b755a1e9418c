//! Byte-sink adapters used by the decorators

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{info, warn};

/// Log level of a [`LogWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLevel {
    /// Emit lines as `info` events
    Info,
    /// Emit lines as `warn` events
    Warn,
}

/// A [`Write`] sink that turns bytes into line-oriented `tracing`
/// events.
///
/// Bytes are buffered until a newline; `flush` (and drop) emits any
/// partial tail line. The trailing newline itself is not part of the
/// emitted message.
#[derive(Debug)]
pub struct LogWriter {
    level: SinkLevel,
    buf: Vec<u8>,
}

impl LogWriter {
    /// Sink emitting `info` events.
    pub fn info() -> Self {
        Self {
            level: SinkLevel::Info,
            buf: Vec::new(),
        }
    }

    /// Sink emitting `warn` events.
    pub fn warn() -> Self {
        Self {
            level: SinkLevel::Warn,
            buf: Vec::new(),
        }
    }

    fn emit(&self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        match self.level {
            SinkLevel::Info => info!("{}", line),
            SinkLevel::Warn => warn!("{}", line),
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let tail = std::mem::take(&mut self.buf);
            self.emit(&tail);
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Duplicates everything written through it into a secondary sink while
/// delivering it to the primary one.
///
/// Only the bytes the primary actually accepted are duplicated, so both
/// sides always see the same stream.
pub struct TeeWriter<'a> {
    primary: &'a mut dyn Write,
    secondary: LogWriter,
}

impl<'a> TeeWriter<'a> {
    /// Tee `primary` into a log sink.
    pub fn new(primary: &'a mut dyn Write, secondary: LogWriter) -> Self {
        Self { primary, secondary }
    }
}

impl Write for TeeWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.primary.write(buf)?;
        self.secondary.write_all(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

/// A cloneable in-memory capture buffer.
///
/// Clones share one underlying buffer, so two output streams can be
/// captured into a single transcript in arrival order. Not thread-safe;
/// the execution loop that feeds it is single-threaded.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured bytes so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    /// Captured bytes as text, lossily decoded.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_writer_accepts_partial_lines() {
        let mut sink = LogWriter::info();
        sink.write_all(b"first li").unwrap();
        sink.write_all(b"ne\nsecond").unwrap();
        sink.flush().unwrap();
        assert!(sink.buf.is_empty());
    }

    #[test]
    fn tee_duplicates_what_the_primary_accepted() {
        let mut primary = Vec::new();
        let mut tee = TeeWriter::new(&mut primary, LogWriter::info());
        tee.write_all(b"both\nsides\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(primary, b"both\nsides\n");
    }

    #[test]
    fn shared_buffer_clones_append_to_one_transcript() {
        let buffer = SharedBuffer::new();
        let mut out = buffer.clone();
        let mut err = buffer.clone();
        out.write_all(b"out").unwrap();
        err.write_all(b"err").unwrap();
        out.write_all(b"!").unwrap();
        assert_eq!(buffer.into_string(), "outerr!");
    }
}
