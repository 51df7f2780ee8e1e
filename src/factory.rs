//! Socket factory abstraction and the address-rotating decorator.

use crate::config::RotationConfig;
use crate::error::ConfigError;
use crate::pool::AddressPool;

use log::{debug, warn};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;

/// A socket that can be bound to a local address before use.
pub trait LocalBind {
    /// Bind the socket to `addr`. Port 0 asks the OS for an ephemeral port.
    fn bind_local(&self, addr: SocketAddr) -> io::Result<()>;
}

impl LocalBind for socket2::Socket {
    fn bind_local(&self, addr: SocketAddr) -> io::Result<()> {
        self.bind(&addr.into())
    }
}

/// Everything a socket factory offers to code that accepts one.
///
/// Variants ending in `_from` carry an explicit local endpoint chosen by the
/// caller.
pub trait SocketFactory: Send + Sync {
    type Socket: LocalBind;

    /// Create an unconnected socket.
    fn create_socket(&self) -> io::Result<Self::Socket>;

    /// Create a socket connected to `host:port`.
    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Socket>;

    /// Create a socket bound to `local` and connected to `host:port`.
    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<Self::Socket>;

    /// Create a socket connected to `addr`.
    fn connect_addr(&self, addr: SocketAddr) -> io::Result<Self::Socket>;

    /// Create a socket bound to `local` and connected to `addr`.
    fn connect_addr_from(&self, addr: SocketAddr, local: SocketAddr) -> io::Result<Self::Socket>;

    /// Wrap a stream that is already connected to `host`.
    fn layer(&self, stream: TcpStream, host: &str) -> io::Result<Self::Socket>;

    /// Cipher suites enabled by default.
    fn default_cipher_suites(&self) -> Vec<String>;

    /// Cipher suites that could be enabled.
    fn supported_cipher_suites(&self) -> Vec<String>;
}

impl<F: SocketFactory + ?Sized> SocketFactory for Arc<F> {
    type Socket = F::Socket;

    fn create_socket(&self) -> io::Result<Self::Socket> {
        (**self).create_socket()
    }

    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Socket> {
        (**self).connect(host, port)
    }

    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<Self::Socket> {
        (**self).connect_from(host, port, local)
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<Self::Socket> {
        (**self).connect_addr(addr)
    }

    fn connect_addr_from(&self, addr: SocketAddr, local: SocketAddr) -> io::Result<Self::Socket> {
        (**self).connect_addr_from(addr, local)
    }

    fn layer(&self, stream: TcpStream, host: &str) -> io::Result<Self::Socket> {
        (**self).layer(stream, host)
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        (**self).default_cipher_suites()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        (**self).supported_cipher_suites()
    }
}

/// Socket factory that binds every new socket to the next address of its
/// [`AddressPool`], unless the caller already picked a local endpoint.
///
/// With an empty pool it behaves exactly like the wrapped factory.
///
/// ```rust,no_run
/// use rotating_source::{BindingSocketFactory, SocketFactory, TcpSocketFactory};
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let factory = BindingSocketFactory::new(TcpSocketFactory::new());
/// factory.set_outgoing_addresses([
///     IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
///     IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
/// ]);
///
/// // Leaves from 192.168.1.1, the next one from 192.168.1.2.
/// let _first = factory.connect("example.com", 443)?;
/// let _second = factory.connect("example.com", 443)?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct BindingSocketFactory<F> {
    delegate: F,
    pool: AddressPool,
}

impl<F: SocketFactory> BindingSocketFactory<F> {
    /// Wrap `delegate` with an empty pool.
    pub fn new(delegate: F) -> Self {
        Self {
            delegate,
            pool: AddressPool::new(),
        }
    }

    /// Wrap `delegate` with the addresses listed in `config`.
    pub fn from_config(delegate: F, config: &RotationConfig) -> Result<Self, ConfigError> {
        let factory = Self::new(delegate);
        factory.set_outgoing_addresses(config.load_addresses()?);
        Ok(factory)
    }

    /// Replace the local addresses used for rotation.
    pub fn set_outgoing_addresses(&self, addresses: impl IntoIterator<Item = IpAddr>) {
        self.pool.set_outgoing_addresses(addresses);
    }

    /// Take the next local address from the rotation.
    pub fn next_local_address(&self) -> Option<IpAddr> {
        self.pool.next_local_address()
    }

    pub fn pool(&self) -> &AddressPool {
        &self.pool
    }

    pub fn delegate(&self) -> &F {
        &self.delegate
    }

    /// Bind to `(address, 0)`. On failure the socket is dropped, which closes
    /// it, before the error is returned.
    fn bind_next(&self, socket: F::Socket) -> io::Result<F::Socket> {
        let Some(address) = self.pool.next_local_address() else {
            return Ok(socket);
        };

        let local = SocketAddr::new(address, 0);
        match socket.bind_local(local) {
            Ok(()) => {
                debug!("Bound new socket to {}", local);
                Ok(socket)
            }
            Err(e) => {
                warn!("Failed to bind socket to {}: {}", local, e);
                drop(socket);
                Err(e)
            }
        }
    }
}

impl<F: SocketFactory> SocketFactory for BindingSocketFactory<F> {
    type Socket = F::Socket;

    fn create_socket(&self) -> io::Result<Self::Socket> {
        let socket = self.delegate.create_socket()?;
        self.bind_next(socket)
    }

    // A connected socket cannot be bound anymore, so the rotated address goes
    // through the delegate's explicit-local variant instead.
    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Socket> {
        match self.pool.next_local_address() {
            Some(address) => {
                debug!("Connecting to {}:{} from {}", host, port, address);
                self.delegate
                    .connect_from(host, port, SocketAddr::new(address, 0))
            }
            None => self.delegate.connect(host, port),
        }
    }

    fn connect_from(&self, host: &str, port: u16, local: SocketAddr) -> io::Result<Self::Socket> {
        self.delegate.connect_from(host, port, local)
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<Self::Socket> {
        match self.pool.next_local_address() {
            Some(address) => {
                debug!("Connecting to {} from {}", addr, address);
                self.delegate
                    .connect_addr_from(addr, SocketAddr::new(address, 0))
            }
            None => self.delegate.connect_addr(addr),
        }
    }

    fn connect_addr_from(&self, addr: SocketAddr, local: SocketAddr) -> io::Result<Self::Socket> {
        self.delegate.connect_addr_from(addr, local)
    }

    fn layer(&self, stream: TcpStream, host: &str) -> io::Result<Self::Socket> {
        self.delegate.layer(stream, host)
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        self.delegate.default_cipher_suites()
    }

    fn supported_cipher_suites(&self) -> Vec<String> {
        self.delegate.supported_cipher_suites()
    }
}
