use std::io::{BufRead, ErrorKind};

use bytes::{BufMut, BytesMut};
use tracing::warn;

use crate::error::{FrameError, Result};
use crate::sentence::{InterfaceId, SentenceBlock, SENMAX, TERMINATOR};

const MAX_BODY: usize = SENMAX - TERMINATOR.len();

enum Line {
    Complete,
    Oversize,
    Eof,
}

/// Frames sentences out of a line-delimited byte stream.
///
/// Each `\n` (or `\r\n`) terminated line becomes one [`SentenceBlock`] with
/// its terminator normalized to `\r\n`. Lines too long to be a sentence are
/// skipped up to the next terminator; reading then carries on normally.
///
/// A final line cut off by end of stream is emitted with a `\r\n` added.
/// It is not dropped as an incomplete line, so a log file written without
/// a trailing newline loses nothing.
pub struct LineReader<R> {
    inner: R,
    source: InterfaceId,
    line: BytesMut,
    discarded: u64,
}

impl<R: BufRead> LineReader<R> {
    /// Create a line reader tagging sentences with `source`.
    pub fn new(inner: R, source: InterfaceId) -> Self {
        Self {
            inner,
            source,
            line: BytesMut::with_capacity(SENMAX),
            discarded: 0,
        }
    }

    /// Read the next sentence (blocking).
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn read_sentence(&mut self) -> Result<Option<SentenceBlock>> {
        loop {
            self.line.clear();
            match self.read_line()? {
                Line::Eof => return Ok(None),
                Line::Oversize => {
                    self.discard();
                    if !self.skip_to_terminator()? {
                        return Ok(None);
                    }
                }
                Line::Complete => {
                    if self.line.last() == Some(&b'\n') {
                        self.line.truncate(self.line.len() - 1);
                        if self.line.last() == Some(&b'\r') {
                            self.line.truncate(self.line.len() - 1);
                        }
                    }
                    if self.line.len() > MAX_BODY {
                        self.discard();
                        continue;
                    }
                    self.line.put_slice(TERMINATOR);
                    let data = self.line.split().freeze();
                    return Ok(Some(SentenceBlock::from_framed(data, self.source)));
                }
            }
        }
    }

    /// Number of lines discarded for exceeding the sentence length limit.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Source tag applied to framed sentences.
    pub fn source(&self) -> InterfaceId {
        self.source
    }

    fn discard(&mut self) {
        self.discarded += 1;
        warn!(
            source = %self.source,
            max = SENMAX,
            "line exceeds max sentence length (discarding)"
        );
    }

    // Fills `self.line` with at most SENMAX bytes of the current line.
    fn read_line(&mut self) -> Result<Line> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if available.is_empty() {
                // A final line without a terminator still counts.
                return Ok(if self.line.is_empty() {
                    Line::Eof
                } else {
                    Line::Complete
                });
            }

            let room = SENMAX - self.line.len();
            let window = &available[..available.len().min(room)];
            if let Some(pos) = window.iter().position(|&b| b == b'\n') {
                self.line.put_slice(&window[..=pos]);
                self.inner.consume(pos + 1);
                return Ok(Line::Complete);
            }

            let taken = window.len();
            self.line.put_slice(window);
            self.inner.consume(taken);
            if self.line.len() >= SENMAX {
                return Ok(Line::Oversize);
            }
        }
    }

    // Returns false if the stream ended before a terminator was seen.
    fn skip_to_terminator(&mut self) -> Result<bool> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if available.is_empty() {
                return Ok(false);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<SentenceBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_sentence().transpose()
    }
}
