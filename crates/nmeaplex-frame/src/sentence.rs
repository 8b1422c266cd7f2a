use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Maximum sentence length in bytes, including the `\r\n` terminator.
pub const SENMAX: usize = 82;

/// Sentence terminator on the wire.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

const DUPLICATE_BIT: u32 = 1 << 31;

/// Identity of an interface, carried by every sentence it produces.
///
/// The two halves of a duplicated interface share the same base number; the
/// half created by duplication has the duplicate bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct InterfaceId(u32);

impl InterfaceId {
    /// Create an id from its base number.
    pub const fn new(n: u32) -> Self {
        Self(n & !DUPLICATE_BIT)
    }

    /// Raw id value (duplicate bit included).
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Id for the sibling created when this interface is duplicated.
    pub const fn duplicate(self) -> Self {
        Self(self.0 | DUPLICATE_BIT)
    }

    /// Whether this id belongs to a duplicated half.
    pub const fn is_duplicate(self) -> bool {
        self.0 & DUPLICATE_BIT != 0
    }

    /// Base number shared by both halves of a pair.
    pub const fn base(self) -> u32 {
        self.0 & !DUPLICATE_BIT
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_duplicate() {
            write!(f, "if-{}b", self.base())
        } else {
            write!(f, "if-{}", self.base())
        }
    }
}

/// One framed sentence.
///
/// Always between 2 and [`SENMAX`] bytes long and always ending in `\r\n`.
/// Cloning is cheap: the bytes are reference counted, which lets the
/// multiplexer fan a sentence out to several outputs without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceBlock {
    data: Bytes,
    source: InterfaceId,
}

impl SentenceBlock {
    /// Build a block from a complete `\r\n`-terminated record.
    pub fn new(data: impl Into<Bytes>, source: InterfaceId) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(FrameError::Empty);
        }
        if data.len() > SENMAX {
            return Err(FrameError::TooLong {
                len: data.len(),
                max: SENMAX,
            });
        }
        if !data.ends_with(TERMINATOR) {
            return Err(FrameError::Unterminated);
        }
        Ok(Self { data, source })
    }

    /// Build a block from an unterminated body, appending `\r\n`.
    pub fn from_body(body: &[u8], source: InterfaceId) -> Result<Self> {
        let len = body.len() + TERMINATOR.len();
        if len > SENMAX {
            return Err(FrameError::TooLong { len, max: SENMAX });
        }
        let mut buf = BytesMut::with_capacity(len);
        buf.put_slice(body);
        buf.put_slice(TERMINATOR);
        Ok(Self {
            data: buf.freeze(),
            source,
        })
    }

    /// Framers only hand over records they have already bounded and terminated.
    pub(crate) fn from_framed(data: Bytes, source: InterfaceId) -> Self {
        debug_assert!(data.len() <= SENMAX && data.ends_with(TERMINATOR));
        Self { data, source }
    }

    /// The full record, terminator included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The record without its trailing `\r\n`.
    pub fn body(&self) -> &[u8] {
        &self.data[..self.data.len() - TERMINATOR.len()]
    }

    /// Number of valid bytes, terminator included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; a block holds at least its terminator.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interface that produced this sentence.
    pub fn source(&self) -> InterfaceId {
        self.source
    }

    /// Retag the block with a new source.
    pub fn with_source(mut self, source: InterfaceId) -> Self {
        self.source = source;
        self
    }
}
