//! Per-address HTTP client state used by the middleware.

use crate::config::RotationConfig;
use crate::error::ConfigError;

use governor::{clock::DefaultClock, middleware::NoOpMiddleware, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// A local address together with the client that sends from it.
#[derive(Debug, Clone)]
pub struct SourceAddress {
    /// The local address requests leave from.
    pub address: IpAddr,
    /// Client bound to `address`.
    pub client: reqwest::Client,
    /// Rate limiter to control requests per second, if configured.
    pub limiter: Option<Arc<Limiter>>,
}

impl SourceAddress {
    /// Build the client and limiter for `address`.
    ///
    /// Fails with [`ConfigError::InvalidRate`] if the configured rate is not a
    /// positive number.
    pub fn new(address: IpAddr, config: &RotationConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().local_address(address);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if config.disable_system_proxy {
            builder = builder.no_proxy();
        }
        let limiter = config
            .max_requests_per_second
            .map(rate_quota)
            .transpose()?
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        let client = builder.tcp_nodelay(config.nodelay).build()?;

        Ok(Self {
            address,
            client,
            limiter,
        })
    }

    /// Wait until the rate limiter admits another request.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Turn a requests-per-second figure into a quota that admits one request
/// every `1 / rps` seconds, so fractional rates are kept.
pub(crate) fn rate_quota(rps: f64) -> Result<Quota, ConfigError> {
    if !rps.is_finite() || rps <= 0.0 {
        return Err(ConfigError::InvalidRate(rps));
    }
    Duration::try_from_secs_f64(rps.recip())
        .ok()
        .and_then(Quota::with_period)
        .ok_or(ConfigError::InvalidRate(rps))
}
