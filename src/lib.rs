//! # rotating-source
//!
//! Spread outgoing connections across several local addresses.
//!
//! This library provides a socket factory decorator that binds each new socket to
//! the next address of a round-robin pool before handing it out, plus a middleware
//! for reqwest that sends each request from the next address of its own pool.
//! Clients issuing many outbound connections use it to avoid being rate limited
//! or blocked on a single source address.

pub mod config;
pub mod error;
pub mod factory;
pub mod middleware;
pub mod pool;
pub mod source;
pub mod tcp;
mod utils;

pub use config::{RotationConfig, RotationConfigBuilder};
pub use error::ConfigError;
pub use factory::{BindingSocketFactory, LocalBind, SocketFactory};
pub use middleware::SourceRotationMiddleware;
pub use pool::AddressPool;
pub use source::SourceAddress;
pub use tcp::TcpSocketFactory;
