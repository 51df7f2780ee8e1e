//! Configuration for local address rotation.

use crate::error::ConfigError;
use crate::utils;

use log::info;
use std::net::IpAddr;
use std::time::Duration;

/// Configuration for the rotating socket factory and middleware.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Local addresses to rotate through, in order.
    pub addresses: Vec<IpAddr>,
    /// Files listing additional local addresses, one per line.
    pub sources: Vec<String>,
    /// Timeout applied when a TCP connection is established.
    pub connect_timeout: Option<Duration>,
    /// Whether `TCP_NODELAY` is set on connected sockets.
    pub nodelay: bool,
    /// Total timeout for requests sent through the middleware.
    pub request_timeout: Option<Duration>,
    /// Maximum requests per second per local address.
    pub max_requests_per_second: Option<f64>,
    /// Ignore proxies configured through the environment.
    pub disable_system_proxy: bool,
}

impl RotationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RotationConfigBuilder {
        RotationConfigBuilder::new()
    }

    /// Collect the inline addresses followed by the contents of every source
    /// file, preserving order and duplicates.
    pub fn load_addresses(&self) -> Result<Vec<IpAddr>, ConfigError> {
        let mut addresses = self.addresses.clone();
        for source in &self.sources {
            let loaded = utils::load_addresses_from_source(source)?;
            info!("Loaded {} local addresses from {}", loaded.len(), source);
            addresses.extend(loaded);
        }
        Ok(addresses)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        RotationConfigBuilder::new().build()
    }
}

/// Builder for `RotationConfig`.
pub struct RotationConfigBuilder {
    addresses: Vec<IpAddr>,
    sources: Vec<String>,
    connect_timeout: Option<Duration>,
    nodelay: Option<bool>,
    request_timeout: Option<Duration>,
    max_requests_per_second: Option<f64>,
    disable_system_proxy: Option<bool>,
}

impl RotationConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            addresses: Vec::new(),
            sources: Vec::new(),
            connect_timeout: None,
            nodelay: None,
            request_timeout: None,
            max_requests_per_second: None,
            disable_system_proxy: None,
        }
    }

    /// Set the local addresses to rotate through.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Set the files to read additional local addresses from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = Some(nodelay);
        self
    }

    /// Set the total timeout for requests sent through the middleware.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum requests per second per local address.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Ignore `HTTP_PROXY` and friends when building clients.
    pub fn disable_system_proxy(mut self, disable: bool) -> Self {
        self.disable_system_proxy = Some(disable);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RotationConfig {
        RotationConfig {
            addresses: self.addresses,
            sources: self.sources,
            connect_timeout: self.connect_timeout,
            nodelay: self.nodelay.unwrap_or(true),
            request_timeout: self.request_timeout,
            max_requests_per_second: self.max_requests_per_second,
            disable_system_proxy: self.disable_system_proxy.unwrap_or(false),
        }
    }
}

impl Default for RotationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
