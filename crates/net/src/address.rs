use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

/// Binds to every local interface.
pub const HOST_ANY: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
/// Lets the operating system pick the port.
pub const PORT_ANY: u16 = 0;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to resolve `{name}`: {source}")]
    Lookup {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("`{0}` has no IPv4 address")]
    NoIpv4(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for Address {
    fn default() -> Self {
        Self::any()
    }
}

impl Address {
    pub const fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    pub const fn any() -> Self {
        Self::new(HOST_ANY, PORT_ANY)
    }

    /// Resolves `name` (a dotted IPv4 literal or a host name) into `self.host`.
    ///
    /// Literals never touch the resolver. Names take the first IPv4 address
    /// the system resolver returns. `self` is left untouched on failure.
    pub fn set_host(&mut self, name: &str) -> Result<(), ResolveError> {
        self.host = resolve_host(name)?;
        Ok(())
    }

    pub fn is_any_host(&self) -> bool {
        self.host == HOST_ANY
    }

    pub fn is_any_port(&self) -> bool {
        self.port == PORT_ANY
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

pub fn resolve_host(name: &str) -> Result<Ipv4Addr, ResolveError> {
    if let Ok(literal) = name.parse::<Ipv4Addr>() {
        return Ok(literal);
    }

    let candidates = (name, PORT_ANY)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            name: name.to_string(),
            source,
        })?;

    candidates
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ResolveError::NoIpv4(name.to_string()))
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
