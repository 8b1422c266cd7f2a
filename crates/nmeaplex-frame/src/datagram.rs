use std::io::ErrorKind;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::sentence::{InterfaceId, SentenceBlock, SENMAX};

/// Receive buffer size for a single datagram read.
pub const BUFSIZ: usize = 8192;

/// Incremental `\r\n` framer for datagram payloads.
///
/// Sentence boundaries are not aligned with datagrams: one datagram may
/// carry several sentences, and a sentence may span datagrams. The framer
/// is fed byte by byte and keeps its partial sentence between calls.
///
/// Bytes beyond [`SENMAX`] are counted, not stored; a sentence that
/// overran is dropped when its terminator arrives. Counters reset only on a
/// terminator, so a stream that never sends one drops everything.
#[derive(Debug)]
pub struct DatagramFramer {
    candidate: BytesMut,
    count: usize,
    overrun: usize,
    cr: bool,
    source: InterfaceId,
    discarded: u64,
}

impl DatagramFramer {
    /// Create a framer tagging sentences with `source`.
    pub fn new(source: InterfaceId) -> Self {
        Self {
            candidate: BytesMut::with_capacity(SENMAX),
            count: 0,
            overrun: 0,
            cr: false,
            source,
            discarded: 0,
        }
    }

    /// Feed one byte; returns a sentence when this byte completes one.
    pub fn push(&mut self, byte: u8) -> Option<SentenceBlock> {
        if self.count < SENMAX {
            self.count += 1;
            self.candidate.put_u8(byte);
        } else {
            self.overrun = self.overrun.saturating_add(1);
        }

        if byte == b'\r' {
            self.cr = true;
            return None;
        }
        let terminated = byte == b'\n' && self.cr;
        self.cr = false;
        if !terminated {
            return None;
        }

        let sentence = if self.overrun > 0 {
            self.discarded += 1;
            debug!(
                source = %self.source,
                overrun = self.overrun,
                "datagram sentence exceeds max length (discarding)"
            );
            self.candidate.clear();
            None
        } else {
            let data = self.candidate.split().freeze();
            Some(SentenceBlock::from_framed(data, self.source))
        };
        self.count = 0;
        self.overrun = 0;
        sentence
    }

    /// Feed a whole datagram, yielding every sentence it completes.
    pub fn feed<'a>(&'a mut self, datagram: &'a [u8]) -> impl Iterator<Item = SentenceBlock> + 'a {
        datagram.iter().filter_map(move |&byte| self.push(byte))
    }

    /// Bytes held for the sentence currently being assembled.
    pub fn pending(&self) -> usize {
        self.count
    }

    /// Bytes dropped from the current candidate since the last terminator.
    pub fn overrun(&self) -> usize {
        self.overrun
    }

    /// Number of sentences dropped for overrunning.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Source tag applied to framed sentences.
    pub fn source(&self) -> InterfaceId {
        self.source
    }
}

/// A blocking source of datagrams.
pub trait DatagramSource {
    /// Receive one datagram into `buf`.
    ///
    /// `Ok(0)` means the source has finished and no more data will come.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Frames sentences out of a [`DatagramSource`].
pub struct DatagramReader<S> {
    inner: S,
    framer: DatagramFramer,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl<S: DatagramSource> DatagramReader<S> {
    /// Create a datagram reader tagging sentences with `source`.
    pub fn new(inner: S, source: InterfaceId) -> Self {
        Self {
            inner,
            framer: DatagramFramer::new(source),
            buf: vec![0u8; BUFSIZ].into_boxed_slice(),
            pos: 0,
            filled: 0,
        }
    }

    /// Read the next sentence, receiving more datagrams as needed (blocking).
    ///
    /// Returns `Ok(None)` once the source reports it has finished.
    pub fn read_sentence(&mut self) -> Result<Option<SentenceBlock>> {
        loop {
            while self.pos < self.filled {
                let byte = self.buf[self.pos];
                self.pos += 1;
                if let Some(sentence) = self.framer.push(byte) {
                    return Ok(Some(sentence));
                }
            }

            let read = match self.inner.recv_datagram(&mut self.buf) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if read == 0 {
                return Ok(None);
            }
            self.pos = 0;
            self.filled = read;
        }
    }

    /// Borrow the framer state.
    pub fn framer(&self) -> &DatagramFramer {
        &self.framer
    }
}
