use std::path::PathBuf;

use nmeaplex_core::{ConfigError, InterfaceError};

/// Errors opening a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Generic interface construction failed.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// Option parsing failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport type is not known.
    #[error("unknown interface type: {0}")]
    UnknownKind(String),

    /// The resolved address is not a multicast group.
    #[error("{0} is not a multicast address")]
    NotMulticast(String),

    /// The resolved address is neither IPv4 nor IPv6.
    #[error("unsupported address family for {0}")]
    UnsupportedFamily(String),

    /// Only stdio can be opened in both directions.
    #[error("bi-directional file I/O only supported for stdin/stdout, not {}", .0.display())]
    BidirectionalFile(PathBuf),

    /// The named network device does not exist.
    #[error("no interface {0} found")]
    NoSuchDevice(String),

    /// Name resolution failed.
    #[error("lookup failed for host {host}/service {service}: {source}")]
    Resolve {
        host: String,
        service: String,
        source: std::io::Error,
    },

    /// Opening a file failed.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A socket operation failed during setup.
    #[error("{context}: {source}")]
    Socket {
        context: &'static str,
        source: std::io::Error,
    },
}

impl TransportError {
    /// Whether this is a configuration problem rather than a system failure.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TransportError::Config(_)
                | TransportError::Interface(InterfaceError::Config(_))
                | TransportError::UnknownKind(_)
                | TransportError::NotMulticast(_)
                | TransportError::UnsupportedFamily(_)
                | TransportError::BidirectionalFile(_)
        )
    }

    pub(crate) fn socket(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| TransportError::Socket { context, source }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
