//! Interface declarations of the form `kind:name=value,...`.
//!
//! `direction`, `name` and `checksum` are interface settings; every other
//! key is passed to the transport as an option.
//!
//! ```text
//! file:filename=-,direction=both
//! mcast:address=239.192.0.1,port=10110,direction=out,checksum=yes
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use nmeaplex_core::{parse_flag, Built, Direction, InterfaceId, InterfaceSetup, Options};
use nmeaplex_transport::{
    classify_ip, AddressClass, FileConfig, MulticastConfig, TransportError, TransportKind,
};

/// A parsed interface declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub kind: TransportKind,
    pub name: Option<String>,
    pub direction: Direction,
    pub checksum: bool,
    /// Transport options, in declaration order.
    pub options: Options,
}

impl InterfaceDecl {
    /// Name used in logs when none was declared.
    pub fn display_name(&self, id: InterfaceId) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}-{}", self.kind, id.get()),
        }
    }

    /// Generic setup for this declaration.
    pub fn setup(&self, id: InterfaceId) -> InterfaceSetup {
        InterfaceSetup::new(id, self.display_name(id), self.direction)
            .with_options(self.options.clone())
            .with_checksum(self.checksum)
    }

    /// Open the transport and build the interface.
    pub fn open(&self, id: InterfaceId) -> Result<Built, TransportError> {
        nmeaplex_transport::open(self.kind, self.setup(id))
    }

    /// Validate the transport options without opening anything.
    ///
    /// Multicast addresses are resolved and classified.
    pub fn check(&self) -> Result<CheckedInterface, TransportError> {
        let (qsize, transport) = match self.kind {
            TransportKind::File => {
                let config = FileConfig::from_options(self.options.clone(), self.direction)?;
                let summary = TransportSummary::File {
                    target: config.target.to_string(),
                };
                (config.qsize, summary)
            }
            TransportKind::Mcast => {
                let config = MulticastConfig::from_options(self.options.clone())?;
                let group = config.resolve()?;
                let scope = classify_ip(group.ip());
                match scope {
                    AddressClass::NotMulticast => {
                        return Err(TransportError::NotMulticast(config.address))
                    }
                    AddressClass::UnsupportedFamily => {
                        return Err(TransportError::UnsupportedFamily(config.address))
                    }
                    _ => {}
                }
                let summary = TransportSummary::Mcast {
                    group,
                    scope,
                    device: config.device,
                };
                (config.qsize, summary)
            }
        };

        Ok(CheckedInterface {
            kind: self.kind,
            name: self.name.clone(),
            direction: self.direction,
            checksum: self.checksum,
            qsize: self.direction.writes().then_some(qsize),
            transport,
        })
    }
}

impl FromStr for InterfaceDecl {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s.split_once(':').unwrap_or((s, ""));
        let kind: TransportKind = kind.parse()?;
        let mut options = Options::parse_list(rest)?;

        let direction = match options.take("direction") {
            Some(value) => value.parse()?,
            None => Direction::In,
        };
        let name = options.take("name").filter(|n| !n.is_empty());
        let checksum = match options.take("checksum") {
            Some(value) => parse_flag("checksum", &value)?,
            None => false,
        };

        Ok(Self {
            kind,
            name,
            direction,
            checksum,
            options,
        })
    }
}

impl fmt::Display for InterfaceDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:direction={}", self.kind, self.direction)?;
        if let Some(name) = &self.name {
            write!(f, ",name={name}")?;
        }
        if self.checksum {
            f.write_str(",checksum=yes")?;
        }
        for kv in self.options.iter() {
            write!(f, ",{}={}", kv.name, kv.value)?;
        }
        Ok(())
    }
}

/// Transport-specific part of a validated declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSummary {
    File {
        target: String,
    },
    Mcast {
        group: SocketAddr,
        scope: AddressClass,
        device: Option<String>,
    },
}

/// Result of [`InterfaceDecl::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedInterface {
    pub kind: TransportKind,
    pub name: Option<String>,
    pub direction: Direction,
    pub checksum: bool,
    /// Output queue size; inputs have none.
    pub qsize: Option<usize>,
    pub transport: TransportSummary,
}
