//! Remote endpoint model

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::TransportError;

/// A remote command-execution target: resolved address, port and login.
///
/// The host name is resolved to a numeric address when the endpoint is
/// constructed, so an unknown host fails here and never at session-open
/// time. Two endpoints are equal when address, port and login all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Resolved address of the server
    addr: IpAddr,
    /// Port to use
    port: u16,
    /// Login name
    login: String,
}

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

impl Endpoint {
    /// Resolve `host` and build an endpoint.
    ///
    /// # Errors
    /// Returns [`TransportError::HostResolution`] when the host does not
    /// resolve, and [`TransportError::InvalidEndpoint`] when `login` is
    /// blank.
    pub fn new(host: &str, port: u16, login: &str) -> Result<Self, TransportError> {
        if login.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "login must not be blank".to_string(),
            ));
        }
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::HostResolution(format!("{host}: {e}")))?
            .next()
            .ok_or_else(|| {
                TransportError::HostResolution(format!("{host}: no addresses returned"))
            })?
            .ip();
        Ok(Self {
            addr,
            port,
            login: login.to_string(),
        })
    }

    /// Resolved numeric address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Port of the server.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login name used for authentication.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Socket address for the TCP connection.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.login, self.addr, self.port)
    }
}
