//! UDP multicast transport.
//!
//! Sentences are sent to, and received from, a multicast group. Received
//! datagrams may carry several sentences or split one across datagrams;
//! [`DatagramReader`] reassembles them. Both halves of a bidirectional
//! interface share one socket, which is closed when the last half drops it.

use std::fmt;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use nmeaplex_core::{
    parse_qsize, Built, ConfigError, Direction, InterfaceSetup, Options, Transport,
};
use nmeaplex_frame::{DatagramReader, DatagramSource, FrameError, InterfaceId, SentenceBlock};
use socket2::{Domain, InterfaceIndexOrAddress, Protocol, SockAddr, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TransportError};

/// Default queue size for multicast outputs.
pub const DEFAULT_MCAST_QSIZE: usize = 64;

/// Registered service name looked up when no port is given.
pub const DEFAULT_SERVICE: &str = "nmea-0183";

/// Port used when [`DEFAULT_SERVICE`] is not in the services database.
pub const DEFAULT_PORT: u16 = 10110;

/// Scope of a multicast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    NotMulticast,
    Global,
    LinkLocal,
    /// IPv6 interface-local; scoped like link-local.
    InterfaceLocal,
    UnsupportedFamily,
}

impl AddressClass {
    pub fn is_multicast(self) -> bool {
        matches!(
            self,
            AddressClass::Global | AddressClass::LinkLocal | AddressClass::InterfaceLocal
        )
    }

    /// Whether the address needs an interface scope.
    pub fn is_scoped(self) -> bool {
        matches!(self, AddressClass::LinkLocal | AddressClass::InterfaceLocal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AddressClass::NotMulticast => "not-multicast",
            AddressClass::Global => "global",
            AddressClass::LinkLocal => "link-local",
            AddressClass::InterfaceLocal => "interface-local",
            AddressClass::UnsupportedFamily => "unsupported-family",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a socket address of any family.
pub fn classify(addr: &SockAddr) -> AddressClass {
    match addr.as_socket() {
        Some(sa) => classify_ip(sa.ip()),
        None => AddressClass::UnsupportedFamily,
    }
}

/// Classify an IP address.
///
/// IPv4 multicast is `224.0.0.0/4`, of which `224.0.0.0/24` is link-local.
/// IPv6 multicast starts with `0xff`; the low nibble of the second byte is
/// the scope.
pub fn classify_ip(ip: IpAddr) -> AddressClass {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            if a & 0xf0 != 0xe0 {
                AddressClass::NotMulticast
            } else if a == 224 && b == 0 && c == 0 {
                AddressClass::LinkLocal
            } else {
                AddressClass::Global
            }
        }
        IpAddr::V6(v6) => {
            let octets = v6.octets();
            if octets[0] != 0xff {
                return AddressClass::NotMulticast;
            }
            match octets[1] & 0x0f {
                1 => AddressClass::InterfaceLocal,
                2 => AddressClass::LinkLocal,
                _ => AddressClass::Global,
            }
        }
    }
}

/// Parsed multicast interface options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Group address or host name.
    pub address: String,
    /// Port number or service name.
    pub port: Option<String>,
    /// Network device used for scoping and outbound traffic.
    pub device: Option<String>,
    pub qsize: usize,
}

impl MulticastConfig {
    /// Build a config from `address`, `port`, `device` and `qsize` options.
    pub fn from_options(options: Options) -> Result<Self> {
        let mut address = None;
        let mut port = None;
        let mut device = None;
        let mut qsize = DEFAULT_MCAST_QSIZE;

        for kv in options {
            if kv.is("device") {
                device = Some(kv.value);
            } else if kv.is("address") {
                address = Some(kv.value);
            } else if kv.is("port") {
                port = Some(kv.value);
            } else if kv.is("qsize") {
                qsize = parse_qsize(&kv.value)?;
            } else {
                return Err(ConfigError::UnknownOption(kv.name).into());
            }
        }

        let address = address.ok_or(ConfigError::MissingOption {
            option: "address",
            kind: "multicast",
        })?;

        Ok(Self {
            address,
            port,
            device,
            qsize,
        })
    }

    /// Service string used in diagnostics.
    pub fn service(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_SERVICE)
    }

    /// Resolve address and port to the first matching socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let resolve_err = |source| TransportError::Resolve {
            host: self.address.clone(),
            service: self.service().to_string(),
            source,
        };

        let port = match &self.port {
            Some(service) => resolve_service(service).ok_or_else(|| {
                resolve_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("unknown service {service}"),
                ))
            })?,
            None => default_port(),
        };

        (self.address.as_str(), port)
            .to_socket_addrs()
            .map_err(resolve_err)?
            .next()
            .ok_or_else(|| resolve_err(io::Error::from(io::ErrorKind::NotFound)))
    }
}

/// Port for the default NMEA service.
pub fn default_port() -> u16 {
    lookup_service(DEFAULT_SERVICE).unwrap_or(DEFAULT_PORT)
}

/// Resolve a numeric port or a UDP service name.
pub fn resolve_service(service: &str) -> Option<u16> {
    match service.trim().parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => lookup_service(service.trim()),
    }
}

// `getservbyname` returns a pointer into static storage shared by every
// caller in the process.
#[cfg(unix)]
static SERVICES: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(unix)]
fn lookup_service(name: &str) -> Option<u16> {
    use std::ffi::CString;

    let name = CString::new(name).ok()?;
    let _lock = SERVICES
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    // SAFETY: both arguments are valid NUL-terminated strings. The returned
    // entry lives in libc static storage; `SERVICES` is held until `s_port`
    // has been copied out, so no other lookup in this crate can overwrite it.
    let entry = unsafe { libc::getservbyname(name.as_ptr(), c"udp".as_ptr()) };
    if entry.is_null() {
        return None;
    }
    // SAFETY: `entry` is non-null and points to a valid `servent`.
    let port = unsafe { (*entry).s_port };
    Some(u16::from_be(port as u16))
}

#[cfg(not(unix))]
fn lookup_service(_name: &str) -> Option<u16> {
    None
}

#[cfg(unix)]
fn interface_index(name: &str) -> Result<u32> {
    use std::ffi::CString;

    let c_name =
        CString::new(name).map_err(|_| TransportError::NoSuchDevice(name.to_string()))?;
    // SAFETY: `c_name` is a valid NUL-terminated string.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(TransportError::NoSuchDevice(name.to_string()));
    }
    Ok(index)
}

#[cfg(not(unix))]
fn interface_index(name: &str) -> Result<u32> {
    Err(TransportError::NoSuchDevice(name.to_string()))
}

#[cfg(target_os = "linux")]
fn set_multicast_if_v4(socket: &Socket, group: Ipv4Addr, ifindex: u32) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let mreqn = libc::ip_mreqn {
        imr_multiaddr: libc::in_addr {
            s_addr: u32::from(group).to_be(),
        },
        imr_address: libc::in_addr {
            s_addr: libc::INADDR_ANY,
        },
        imr_ifindex: ifindex as libc::c_int,
    };

    // SAFETY: `mreqn` is a fully initialized `ip_mreqn` and the length
    // matches; the descriptor is owned by `socket` and open.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MULTICAST_IF,
            (&mreqn as *const libc::ip_mreqn).cast::<libc::c_void>(),
            std::mem::size_of::<libc::ip_mreqn>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn set_multicast_if_v4(_socket: &Socket, _group: Ipv4Addr, ifindex: u32) -> io::Result<()> {
    warn!(ifindex, "outbound IPv4 multicast device selection not supported on this platform");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Membership {
    V4 { group: Ipv4Addr, ifindex: u32 },
    V6 { group: Ipv6Addr, ifindex: u32 },
}

impl Membership {
    fn new(group: IpAddr, ifindex: u32) -> Self {
        match group {
            IpAddr::V4(group) => Membership::V4 { group, ifindex },
            IpAddr::V6(group) => Membership::V6 { group, ifindex },
        }
    }

    fn set_outbound(&self, socket: &Socket) -> io::Result<()> {
        match *self {
            Membership::V4 { group, ifindex } => set_multicast_if_v4(socket, group, ifindex),
            Membership::V6 { ifindex, .. } => socket.set_multicast_if_v6(ifindex),
        }
    }

    fn join(&self, socket: &Socket) -> io::Result<()> {
        match *self {
            Membership::V4 { group, ifindex } => {
                socket.join_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(ifindex))
            }
            Membership::V6 { group, ifindex } => socket.join_multicast_v6(&group, ifindex),
        }
    }

    fn leave(&self, socket: &Socket) -> io::Result<()> {
        match *self {
            Membership::V4 { group, ifindex } => {
                socket.leave_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(ifindex))
            }
            Membership::V6 { group, ifindex } => socket.leave_multicast_v6(&group, ifindex),
        }
    }
}

// Owned by both halves of a pair; dropping the last handle closes the socket.
struct McastSocket {
    socket: Socket,
    dest: SockAddr,
    group: SocketAddr,
    membership: Membership,
}

impl McastSocket {
    fn bind(&self) -> io::Result<()> {
        self.socket.bind(&self.dest)
    }
}

impl Drop for McastSocket {
    fn drop(&mut self) {
        debug!(group = %self.group, "closing multicast socket");
    }
}

struct SocketSource(Arc<McastSocket>);

impl DatagramSource for SocketSource {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = (&self.0.socket).read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            trace!(group = %self.0.group, "ignoring empty datagram");
        }
    }
}

/// One direction of a multicast interface.
pub struct MulticastTransport {
    shared: Arc<McastSocket>,
    reader: Option<DatagramReader<SocketSource>>,
}

impl MulticastTransport {
    /// Resolve, classify, create the socket and join the group.
    ///
    /// Input interfaces are bound to the group address. A bidirectional
    /// interface is bound when it is split.
    pub fn open(config: &MulticastConfig, id: InterfaceId, direction: Direction) -> Result<Self> {
        let mut group = config.resolve()?;
        let class = classify_ip(group.ip());
        match class {
            AddressClass::NotMulticast => {
                return Err(TransportError::NotMulticast(config.address.clone()))
            }
            AddressClass::UnsupportedFamily => {
                return Err(TransportError::UnsupportedFamily(config.address.clone()))
            }
            _ => {}
        }

        let ifindex = match &config.device {
            Some(device) => interface_index(device)?,
            None => 0,
        };
        if ifindex != 0 && class.is_scoped() {
            if let SocketAddr::V6(v6) = &mut group {
                v6.set_scope_id(ifindex);
            }
        }

        let socket = Socket::new(Domain::for_address(group), Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::socket("could not create UDP socket"))?;
        let membership = Membership::new(group.ip(), ifindex);

        if ifindex != 0 {
            membership
                .set_outbound(&socket)
                .map_err(TransportError::socket("failed to set multicast interface"))?;
        }
        membership
            .join(&socket)
            .map_err(TransportError::socket("failed to join multicast group"))?;
        if direction.reads() {
            socket
                .set_reuse_address(true)
                .map_err(TransportError::socket("failed to set SO_REUSEADDR"))?;
        }

        let shared = Arc::new(McastSocket {
            socket,
            dest: SockAddr::from(group),
            group,
            membership,
        });

        let reader = if direction == Direction::In {
            shared.bind().map_err(TransportError::socket("bind failed"))?;
            Some(DatagramReader::new(SocketSource(Arc::clone(&shared)), id))
        } else {
            None
        };

        info!(
            interface = %id,
            group = %group,
            scope = %class,
            ifindex,
            direction = %direction,
            "joined multicast group"
        );
        Ok(Self { shared, reader })
    }

    /// Group socket address, with scope id when applicable.
    pub fn group(&self) -> SocketAddr {
        self.shared.group
    }
}

impl Transport for MulticastTransport {
    fn kind(&self) -> &'static str {
        "mcast"
    }

    fn read_sentence(&mut self) -> nmeaplex_frame::Result<Option<SentenceBlock>> {
        match &mut self.reader {
            Some(reader) => reader.read_sentence(),
            None => Err(FrameError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "multicast interface not opened for reading",
            ))),
        }
    }

    fn write_sentence(&mut self, sentence: &SentenceBlock) -> nmeaplex_frame::Result<()> {
        let shared = &self.shared;
        loop {
            match shared.socket.send_to(sentence.as_bytes(), &shared.dest) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn duplicate(&mut self, id: InterfaceId) -> io::Result<Box<dyn Transport>> {
        self.shared.bind().map_err(|err| {
            io::Error::new(err.kind(), format!("duplicate bind failed: {err}"))
        })?;
        Ok(Box::new(MulticastTransport {
            shared: Arc::clone(&self.shared),
            reader: Some(DatagramReader::new(
                SocketSource(Arc::clone(&self.shared)),
                id,
            )),
        }))
    }

    fn cleanup(&mut self, direction: Direction) {
        if direction != Direction::In {
            return;
        }
        if let Err(err) = self.shared.membership.leave(&self.shared.socket) {
            warn!(group = %self.shared.group, error = %err, "failed to leave multicast group");
        }
    }
}

impl fmt::Debug for MulticastTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulticastTransport")
            .field("group", &self.shared.group)
            .field("membership", &self.shared.membership)
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

/// Parse options, open the socket and build the interface.
pub fn open(mut setup: InterfaceSetup) -> Result<Built> {
    let config = MulticastConfig::from_options(setup.take_options())?;
    let transport = MulticastTransport::open(&config, setup.id, setup.direction)?;
    Ok(setup.build(Box::new(transport), config.qsize)?)
}
