//! Interface and queue multiplexing core for nmeaplex.
//!
//! An [`Interface`] wraps one transport endpoint behind the [`Transport`]
//! trait. Readers push framed sentences onto a [`BoundedQueue`]; writers pop
//! them off and transmit. Bidirectional interfaces are split into an input
//! half and an output half that share the transport's resources. The
//! [`Mux`] ties a set of interfaces together and runs one thread per half.

pub mod error;
pub mod filter;
pub mod interface;
pub mod mux;
pub mod options;
pub mod queue;

pub use error::{ConfigError, InterfaceError, QueueError, Result};
pub use filter::{checksum_ok, nmea_checksum, AcceptAll, FilterHandle, NmeaChecksum, SentenceFilter};
pub use interface::{
    Built, Direction, ExitReason, Interface, InterfaceExit, InterfaceSetup, Transport,
};
pub use mux::{Mux, RunningMux, DEFAULT_MUX_QSIZE};
pub use nmeaplex_frame::{InterfaceId, SentenceBlock};
pub use options::{parse_flag, parse_qsize, KeyValue, Options};
pub use queue::{BoundedQueue, QueueClosed};
