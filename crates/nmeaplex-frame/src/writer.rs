use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::sentence::{SentenceBlock, SENMAX};

/// Writes sentences as text lines.
///
/// The `\r\n` terminator of each block is replaced by a single `\n`, which
/// is what file and stdio sinks expect.
pub struct SentenceWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> SentenceWriter<T> {
    /// Create a new sentence writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(SENMAX),
        }
    }

    /// Write one sentence followed by `\n` and flush (blocking).
    pub fn write_sentence(&mut self, sentence: &SentenceBlock) -> Result<()> {
        self.buf.clear();
        self.buf.put_slice(sentence.body());
        self.buf.put_u8(b'\n');

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
