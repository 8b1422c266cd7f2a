/// Errors that can occur while framing or writing sentences.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The record is longer than a sentence may be.
    #[error("sentence too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    /// The record is empty.
    #[error("empty sentence")]
    Empty,

    /// The record does not end with `\r\n`.
    #[error("sentence is not terminated by CRLF")]
    Unterminated,

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted no more bytes.
    #[error("stream closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
