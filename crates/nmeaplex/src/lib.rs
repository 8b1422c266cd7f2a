//! NMEA 0183 sentence multiplexer.
//!
//! nmeaplex reads sentences from any number of inputs (files, stdio, UDP
//! multicast groups) and copies each one to every output except the one it
//! came from.
//!
//! # Crate Structure
//!
//! - [`frame`]: sentence blocks and line/datagram framing
//! - [`mux`]: interfaces, bounded queues, filters and routing
//! - [`transport`]: file/stdio and multicast transports
//! - [`decl`]: `kind:name=value,...` interface declarations

pub mod decl;

pub use decl::{CheckedInterface, InterfaceDecl, TransportSummary};

/// Re-export frame types.
pub mod frame {
    pub use nmeaplex_frame::*;
}

/// Re-export core types.
pub mod mux {
    pub use nmeaplex_core::*;
}

/// Re-export transport types.
pub mod transport {
    pub use nmeaplex_transport::*;
}
