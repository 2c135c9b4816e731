//! Protocol registry and endpoint resolution
//!
//! A protocol tag from the configuration ("tcp", "udp", "unix+tcp",
//! "unix+udp") resolves through the [`ProtocolRegistry`] into a
//! [`ProtocolFamily`] carrying capability flags. A family plus an address
//! becomes a [`Peer`] (connect side) or a [`BindEndpoint`] (bind side) that
//! knows how to dial or bind the right socket type.
//!
//! The registry is a value built once at startup and immutable afterwards.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
#[cfg(unix)]
use tokio::net::{UnixDatagram, UnixListener, UnixStream};

use ffwd_config::PluginConfig;

use crate::{IoStream, TransportError};

/// Keepalive idle time applied to dialed TCP streams
const TCP_KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// A wire protocol family known to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    Tcp,
    Udp,
    UnixTcp,
    UnixUdp,
}

impl ProtocolFamily {
    /// The configuration tag for this family
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::UnixTcp => "unix+tcp",
            Self::UnixUdp => "unix+udp",
        }
    }

    /// Whether the family is datagram-oriented
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Udp | Self::UnixUdp)
    }

    /// Whether the family uses filesystem socket paths
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::UnixTcp | Self::UnixUdp)
    }

    /// Whether inbound servers can bind this family
    pub fn supports_bind(&self) -> bool {
        true
    }

    /// Whether connect clients can dial this family.
    ///
    /// The reconnecting client is stream-oriented; datagram output is not
    /// part of the core.
    pub fn supports_connect(&self) -> bool {
        !self.is_datagram()
    }

    /// Whether the family can carry a tunnel control link.
    ///
    /// No built-in family does; the tunnel wire protocol lives outside the
    /// core.
    pub fn supports_tunnel(&self) -> bool {
        false
    }
}

/// Immutable tag → family table.
#[derive(Debug)]
pub struct ProtocolRegistry {
    entries: HashMap<&'static str, ProtocolFamily>,
}

impl ProtocolRegistry {
    /// The built-in protocol table
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        for family in [
            ProtocolFamily::Tcp,
            ProtocolFamily::Udp,
            ProtocolFamily::UnixTcp,
            ProtocolFamily::UnixUdp,
        ] {
            entries.insert(family.tag(), family);
        }
        Self { entries }
    }

    /// Resolve a protocol tag
    pub fn resolve(&self, tag: &str) -> Result<ProtocolFamily, TransportError> {
        self.entries
            .get(tag)
            .copied()
            .ok_or_else(|| TransportError::UnknownProtocol { tag: tag.into() })
    }

    /// All known tags, sorted
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

/// A resolved socket address, inet or filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Inet { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inet { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

fn resolve_address(
    family: ProtocolFamily,
    config: &PluginConfig,
) -> Result<Address, TransportError> {
    if family.is_unix() {
        let path = config.path.clone().ok_or_else(|| {
            TransportError::invalid_endpoint(format!("protocol {:?} requires `path`", family.tag()))
        })?;
        Ok(Address::Unix { path })
    } else {
        let host = config.host.clone().ok_or_else(|| {
            TransportError::invalid_endpoint(format!("protocol {:?} requires `host`", family.tag()))
        })?;
        let port = config.port.ok_or_else(|| {
            TransportError::invalid_endpoint(format!("protocol {:?} requires `port`", family.tag()))
        })?;
        Ok(Address::Inet { host, port })
    }
}

/// An outbound peer a connect client dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    family: ProtocolFamily,
    address: Address,
}

impl Peer {
    /// Create a peer, checking the family supports connecting
    pub fn new(family: ProtocolFamily, address: Address) -> Result<Self, TransportError> {
        if !family.supports_connect() {
            return Err(TransportError::Unsupported {
                tag: family.tag(),
                capability: "connect",
            });
        }
        Ok(Self { family, address })
    }

    /// Resolve a peer from a plugin config entry
    pub fn from_config(
        registry: &ProtocolRegistry,
        config: &PluginConfig,
    ) -> Result<Self, TransportError> {
        let family = registry.resolve(&config.protocol)?;
        Self::new(family, resolve_address(family, config)?)
    }

    /// Protocol family
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    /// Open a stream to the peer.
    ///
    /// TCP streams get nodelay and keepalive; failures to set either are
    /// logged and ignored.
    pub async fn dial(&self) -> io::Result<Box<dyn IoStream>> {
        match (&self.family, &self.address) {
            (ProtocolFamily::Tcp, Address::Inet { host, port }) => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                configure_tcp_stream(&stream);
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            (ProtocolFamily::UnixTcp, Address::Unix { path }) => {
                let stream = UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot dial {self}"),
            )),
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.family.tag(), self.address)
    }
}

/// An inbound listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindEndpoint {
    family: ProtocolFamily,
    address: Address,
}

impl BindEndpoint {
    /// Create a bind endpoint
    pub fn new(family: ProtocolFamily, address: Address) -> Self {
        Self { family, address }
    }

    /// Resolve a bind endpoint from a plugin config entry
    pub fn from_config(
        registry: &ProtocolRegistry,
        config: &PluginConfig,
    ) -> Result<Self, TransportError> {
        let family = registry.resolve(&config.protocol)?;
        Ok(Self::new(family, resolve_address(family, config)?))
    }

    /// Protocol family
    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    /// Bind a stream listener for this endpoint
    pub async fn bind_stream(&self) -> io::Result<StreamListener> {
        match (&self.family, &self.address) {
            (ProtocolFamily::Tcp, Address::Inet { host, port }) => {
                let listener = TcpListener::bind((host.as_str(), *port)).await?;
                Ok(StreamListener::Tcp(listener))
            }
            #[cfg(unix)]
            (ProtocolFamily::UnixTcp, Address::Unix { path }) => {
                remove_stale_socket(path);
                let listener = UnixListener::bind(path)?;
                Ok(StreamListener::Unix(listener))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot stream-bind {self}"),
            )),
        }
    }

    /// Bind a datagram socket for this endpoint
    pub async fn bind_datagram(&self) -> io::Result<DatagramSocket> {
        match (&self.family, &self.address) {
            (ProtocolFamily::Udp, Address::Inet { host, port }) => {
                let socket = UdpSocket::bind((host.as_str(), *port)).await?;
                Ok(DatagramSocket::Udp(socket))
            }
            #[cfg(unix)]
            (ProtocolFamily::UnixUdp, Address::Unix { path }) => {
                remove_stale_socket(path);
                let socket = UnixDatagram::bind(path)?;
                Ok(DatagramSocket::Unix(socket))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot datagram-bind {self}"),
            )),
        }
    }
}

impl std::fmt::Display for BindEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.family.tag(), self.address)
    }
}

/// A bound stream listener, tcp or unix.
pub enum StreamListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl StreamListener {
    /// Accept one connection; the second element is a peer label for logs.
    pub async fn accept(&self) -> io::Result<(Box<dyn IoStream>, String)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                configure_tcp_stream(&stream);
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Self::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), "unix".into()))
            }
        }
    }

    /// Local address, for tcp listeners bound to port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }
}

/// A bound datagram socket, udp or unix.
pub enum DatagramSocket {
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixDatagram),
}

impl DatagramSocket {
    /// Receive one datagram
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Udp(socket) => Ok(socket.recv_from(buf).await?.0),
            #[cfg(unix)]
            Self::Unix(socket) => Ok(socket.recv_from(buf).await?.0),
        }
    }

    /// Local address, for udp sockets bound to port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Udp(socket) => socket.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }
}

/// Set nodelay and keepalive on a TCP stream; both are non-fatal.
fn configure_tcp_stream(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }

    let sock_ref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new().with_time(TCP_KEEPALIVE_TIME);
    #[cfg(target_os = "linux")]
    let keepalive = keepalive.with_interval(TCP_KEEPALIVE_TIME);

    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to set TCP keepalive");
    }
}

/// Remove a stale socket file left by a previous run.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}
