//! Line-oriented archive reader and writer.

use std::io::{BufRead, Read, Write};

use framevault_common::{Error, Result};
use tracing::{debug, trace};

/// Upper bound on how many times one frame may be replicated.
pub const MAX_REPLICAS: usize = 100;

/// Longest line the reader will buffer (16 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Writes frame lines with replication and per-object separators.
pub struct ArchiveWriter<W: Write> {
    inner: W,
    replicas: usize,
    separator_lines: usize,
    lines_written: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer that repeats every frame `replicas` times.
    ///
    /// # Errors
    /// - Returns error if `replicas` is zero or above MAX_REPLICAS
    pub fn new(inner: W, replicas: usize, separator_lines: usize) -> Result<Self> {
        if replicas == 0 || replicas > MAX_REPLICAS {
            return Err(Error::InvalidInput(format!(
                "Replication factor must be within 1..={}, got {}",
                MAX_REPLICAS, replicas
            )));
        }
        Ok(Self {
            inner,
            replicas,
            separator_lines,
            lines_written: 0,
        })
    }

    /// Write one encoded frame line `replicas` times consecutively.
    ///
    /// # Preconditions
    /// - `line` holds exactly one frame and no embedded newline
    pub fn write_frame(&mut self, line: &str) -> Result<()> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.contains('\n') {
            return Err(Error::InvalidInput("Frame line contains a newline".to_string()));
        }

        for _ in 0..self.replicas {
            self.inner.write_all(line.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        self.lines_written += self.replicas as u64;
        Ok(())
    }

    /// Close the current object: emit the separator run and flush.
    ///
    /// Flushing here bounds what a crash can lose to the object in flight.
    pub fn end_object(&mut self) -> Result<()> {
        for _ in 0..self.separator_lines {
            self.inner.write_all(b"\n")?;
        }
        self.lines_written += self.separator_lines as u64;
        self.inner.flush()?;
        trace!(lines = self.lines_written, "Object flushed");
        Ok(())
    }

    /// Total lines written so far, separators included.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        debug!(lines = self.lines_written, "Archive written");
        Ok(self.inner)
    }
}

/// One non-blank line read from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLine {
    /// 1-based line number in the stream.
    pub number: u64,
    /// Line bytes without the trailing line terminator.
    pub bytes: Vec<u8>,
}

/// Streams the non-blank lines of an archive.
///
/// Yields `Err(Error::Format)` for a line longer than the limit (the line is
/// skipped and reading continues) and `Err(Error::Io)` when the underlying
/// reader fails, after which iteration should stop.
pub struct ArchiveReader<R: BufRead> {
    inner: R,
    max_line_length: usize,
    line_number: u64,
    blank_lines: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> ArchiveReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_line_length(inner, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(inner: R, max_line_length: usize) -> Self {
        Self {
            inner,
            max_line_length,
            line_number: 0,
            blank_lines: 0,
            buf: Vec::new(),
        }
    }

    /// Lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }

    /// Blank or whitespace-only lines skipped so far.
    pub fn blank_lines(&self) -> u64 {
        self.blank_lines
    }

    fn discard_rest_of_line(&mut self) -> Result<()> {
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }

    fn next_line(&mut self) -> Result<Option<ArchiveLine>> {
        loop {
            self.buf.clear();
            let limit = self.max_line_length as u64 + 1;
            let read = (&mut self.inner).take(limit).read_until(b'\n', &mut self.buf)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            if !self.buf.ends_with(b"\n") && self.buf.len() > self.max_line_length {
                self.discard_rest_of_line()?;
                return Err(Error::Format(format!(
                    "Line {} exceeds {} bytes",
                    self.line_number, self.max_line_length
                )));
            }

            let trimmed = self.buf.trim_ascii();
            if trimmed.is_empty() {
                self.blank_lines += 1;
                continue;
            }

            return Ok(Some(ArchiveLine {
                number: self.line_number,
                bytes: trimmed.to_vec(),
            }));
        }
    }
}

impl<R: BufRead> Iterator for ArchiveReader<R> {
    type Item = Result<ArchiveLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
