//! Plain TCP socket factory backed by `socket2`.

use crate::config::RotationConfig;
use crate::factory::SocketFactory;

use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Creates TCP sockets, optionally bound to a local endpoint before connecting.
///
/// Host names go through the system resolver. Every resolved address of the
/// right family is tried in order; the last error is returned if none connect.
#[derive(Debug, Clone)]
pub struct TcpSocketFactory {
    domain: Domain,
    connect_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpSocketFactory {
    /// Factory whose unconnected sockets are IPv4.
    pub fn new() -> Self {
        Self {
            domain: Domain::IPV4,
            connect_timeout: None,
            nodelay: true,
        }
    }

    /// Factory whose unconnected sockets are IPv6.
    pub fn ipv6() -> Self {
        Self {
            domain: Domain::IPV6,
            ..Self::new()
        }
    }

    /// Factory using the timeouts of `config`.
    ///
    /// Unconnected sockets are IPv6 when every inline address of `config` is
    /// IPv6, IPv4 otherwise. An unconnected socket has a single family, so a
    /// pool mixing both families fails to bind the addresses of the other one;
    /// use the `connect*` variants for mixed pools.
    pub fn from_config(config: &RotationConfig) -> Self {
        let all_ipv6 = !config.addresses.is_empty()
            && config.addresses.iter().all(|address| address.is_ipv6());
        Self {
            domain: if all_ipv6 { Domain::IPV6 } else { Domain::IPV4 },
            connect_timeout: config.connect_timeout,
            nodelay: config.nodelay,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    fn open(&self, remote: SocketAddr, local: Option<SocketAddr>) -> io::Result<Socket> {
        let socket = Socket::new(Domain::for_address(remote), Type::STREAM, Some(Protocol::TCP))?;
        if let Some(local) = local {
            socket.bind(&local.into())?;
        }
        match self.connect_timeout {
            Some(timeout) => socket.connect_timeout(&remote.into(), timeout)?,
            None => socket.connect(&remote.into())?,
        }
        socket.set_nodelay(self.nodelay)?;
        Ok(socket)
    }

    fn open_host(&self, host: &str, port: u16, local: Option<SocketAddr>) -> io::Result<Socket> {
        let candidates: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()?
            .filter(|remote| local.map_or(true, |l| l.is_ipv4() == remote.is_ipv4()))
            .collect();

        let mut last_err = None;
        for remote in candidates {
            match self.open(remote, local) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    debug!("Connecting to {} ({}) failed: {}", host, remote, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address of {host} matches the local address family"),
            )
        }))
    }
}

impl Default for TcpSocketFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketFactory for TcpSocketFactory {
    type Socket = Socket;

    fn create_socket(&self) -> io::Result<Socket> {
        Socket::new(self.domain, Type::STREAM, Some(Protocol::TCP))
    }

    fn connect(&self, host: &str, port: u16) -> io::Result<Socket> {
        self.open_host(host, port, None)
    }

    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<Socket> {
        self.open_host(host, port, Some(local))
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<Socket> {
        self.open(addr, None)
    }

    fn connect_addr_from(&self, addr: SocketAddr, local: SocketAddr) -> io::Result<Socket> {
        self.open(addr, Some(local))
    }

    fn layer(&self, stream: TcpStream, _host: &str) -> io::Result<Socket> {
        Ok(Socket::from(stream))
    }

    // Plain TCP negotiates no cipher suites.
    fn default_cipher_suites(&self) -> Vec<String> {
        Vec::new()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::BindingSocketFactory;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, TcpListener};

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn local_addr(socket: &Socket) -> SocketAddr {
        socket.local_addr().unwrap().as_socket().unwrap()
    }

    #[test]
    fn unconnected_socket_gets_ephemeral_port_on_rotated_address() {
        let factory = BindingSocketFactory::new(TcpSocketFactory::new());
        factory.set_outgoing_addresses([LOOPBACK]);

        let socket = factory.create_socket().unwrap();
        let local = local_addr(&socket);

        assert_eq!(local.ip(), LOOPBACK);
        assert_ne!(local.port(), 0);
    }

    #[test]
    fn unconnected_socket_without_addresses_stays_unbound() {
        let factory = BindingSocketFactory::new(TcpSocketFactory::new());

        let socket = factory.create_socket().unwrap();
        let local = local_addr(&socket);

        assert_eq!(local.port(), 0);
    }

    #[test]
    fn connection_leaves_from_rotated_address() {
        let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
        let remote = listener.local_addr().unwrap();
        let factory = BindingSocketFactory::new(
            TcpSocketFactory::new().with_connect_timeout(Duration::from_secs(5)),
        );
        factory.set_outgoing_addresses([LOOPBACK]);

        let socket = factory.connect_addr(remote).unwrap();
        let (_accepted, peer) = listener.accept().unwrap();

        assert_eq!(peer.ip(), LOOPBACK);
        assert_eq!(peer, local_addr(&socket));
    }

    #[test]
    fn host_resolution_keeps_local_address_family() {
        let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = BindingSocketFactory::new(TcpSocketFactory::new());
        factory.set_outgoing_addresses([LOOPBACK]);

        let socket = factory.connect("localhost", port).unwrap();
        let (_accepted, peer) = listener.accept().unwrap();

        assert_eq!(peer, local_addr(&socket));
    }

    #[test]
    fn mismatched_family_fails_to_bind() {
        let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
        let remote = listener.local_addr().unwrap();
        let factory = TcpSocketFactory::new();

        let local = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 0);
        assert!(factory.connect_addr_from(remote, local).is_err());
    }

    #[test]
    fn layered_stream_keeps_its_endpoints() {
        let listener = TcpListener::bind((LOOPBACK, 0)).unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let expected = stream.local_addr().unwrap();

        let socket = TcpSocketFactory::new().layer(stream, "localhost").unwrap();

        assert_eq!(local_addr(&socket), expected);
    }

    #[test]
    fn domain_follows_configured_address_family() {
        let ipv6 = RotationConfig::builder()
            .addresses([IpAddr::V6(Ipv6Addr::LOCALHOST)])
            .build();
        assert_eq!(TcpSocketFactory::from_config(&ipv6).domain, Domain::IPV6);

        let mixed = RotationConfig::builder()
            .addresses([IpAddr::V6(Ipv6Addr::LOCALHOST), LOOPBACK])
            .build();
        assert_eq!(TcpSocketFactory::from_config(&mixed).domain, Domain::IPV4);

        let empty = RotationConfig::default();
        assert_eq!(TcpSocketFactory::from_config(&empty).domain, Domain::IPV4);
    }

    #[test]
    fn plain_tcp_has_no_cipher_suites() {
        let factory = BindingSocketFactory::new(TcpSocketFactory::new());

        assert!(factory.default_cipher_suites().is_empty());
        assert!(factory.supported_cipher_suites().is_empty());
    }
}
