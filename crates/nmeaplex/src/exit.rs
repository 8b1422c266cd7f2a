use std::fmt;
use std::io;

use nmeaplex_core::InterfaceError;
use nmeaplex_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;
/// 128 + SIGINT.
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        _ => TRANSPORT_ERROR,
    }
}

fn interface_code(err: &InterfaceError) -> i32 {
    match err {
        InterfaceError::Config(_) => USAGE,
        InterfaceError::Duplicate { source, .. } => io_code(source),
        InterfaceError::Queue(_) | InterfaceError::Spawn { .. } => INTERNAL,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = if err.is_config() {
        USAGE
    } else {
        match &err {
            TransportError::Open { source, .. }
            | TransportError::Socket { source, .. }
            | TransportError::Resolve { source, .. } => io_code(source),
            TransportError::Interface(inner) => interface_code(inner),
            _ => TRANSPORT_ERROR,
        }
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn interface_error(context: &str, err: InterfaceError) -> CliError {
    CliError::new(interface_code(&err), format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use nmeaplex_core::{ConfigError, QueueError};

    use super::*;

    #[test]
    fn configuration_errors_are_usage() {
        let err = transport_error(
            "interface 1",
            TransportError::Config(ConfigError::UnknownOption("baud".into())),
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("baud"));

        let err = transport_error("interface 1", TransportError::BidirectionalFile("/x".into()));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn setup_failures_are_transport_errors() {
        let err = transport_error(
            "interface 2",
            TransportError::Socket {
                context: "bind failed",
                source: io::Error::from(io::ErrorKind::AddrInUse),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = transport_error(
            "interface 2",
            TransportError::Open {
                path: "/root/secret".into(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn queue_failures_are_internal() {
        let err = interface_error("mux", InterfaceError::Queue(QueueError::Alloc(1 << 40)));
        assert_eq!(err.code, INTERNAL);
    }
}
