//! Sentence framing for nmeaplex.
//!
//! Every record that moves through the multiplexer is a [`SentenceBlock`]:
//! at most [`SENMAX`] bytes of ASCII text ending in `\r\n`, tagged with the
//! interface it came from. Two framers turn raw input into blocks:
//! - [`LineReader`] for line-delimited byte streams (files, stdio)
//! - [`DatagramReader`] / [`DatagramFramer`] for datagram transports, where
//!   sentences may be split across or packed into datagrams

pub mod datagram;
pub mod error;
pub mod line;
pub mod sentence;
pub mod writer;

pub use datagram::{DatagramFramer, DatagramReader, DatagramSource, BUFSIZ};
pub use error::{FrameError, Result};
pub use line::LineReader;
pub use sentence::{InterfaceId, SentenceBlock, SENMAX, TERMINATOR};
pub use writer::SentenceWriter;
