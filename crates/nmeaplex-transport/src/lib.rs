//! Transports for nmeaplex.
//!
//! - [`file`]: files, pipes and stdio, one sentence per line
//! - [`mcast`]: UDP multicast groups, IPv4 and IPv6
//!
//! [`open`] dispatches on [`TransportKind`] and returns a ready
//! [`Built`] interface (or pair, for bidirectional interfaces).

pub mod error;
pub mod file;
pub mod mcast;

use std::fmt;
use std::str::FromStr;

use nmeaplex_core::{Built, InterfaceSetup};

pub use error::{Result, TransportError};
pub use file::{FileConfig, FileTarget, FileTransport, DEFAULT_FILE_QSIZE};
pub use mcast::{
    classify, classify_ip, AddressClass, MulticastConfig, MulticastTransport,
    DEFAULT_MCAST_QSIZE,
};

/// Supported transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    File,
    Mcast,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::File, TransportKind::Mcast];

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::File => "file",
            TransportKind::Mcast => "mcast",
        }
    }

    /// Queue size used when the interface gives none.
    pub fn default_qsize(self) -> usize {
        match self {
            TransportKind::File => DEFAULT_FILE_QSIZE,
            TransportKind::Mcast => DEFAULT_MCAST_QSIZE,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TransportKind::File),
            "mcast" | "multicast" => Ok(TransportKind::Mcast),
            _ => Err(TransportError::UnknownKind(s.to_string())),
        }
    }
}

/// Open a transport and build its interface.
pub fn open(kind: TransportKind, setup: InterfaceSetup) -> Result<Built> {
    match kind {
        TransportKind::File => file::open(setup),
        TransportKind::Mcast => mcast::open(setup),
    }
}
