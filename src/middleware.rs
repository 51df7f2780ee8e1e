//! Middleware implementation for reqwest.

use crate::config::RotationConfig;
use crate::error::ConfigError;
use crate::pool::AddressPool;
use crate::source::{self, SourceAddress};

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Middleware that sends each request from the next local address of its pool.
///
/// With an empty pool requests continue down the middleware chain untouched.
/// Otherwise the request is executed by a client bound to the chosen address
/// and middleware registered after this one is skipped, so register it last.
#[derive(Clone)]
pub struct SourceRotationMiddleware {
    inner: Arc<Inner>,
}

struct Inner {
    pool: AddressPool,
    config: RotationConfig,
    /// Clients already built for a local address.
    sources: RwLock<HashMap<IpAddr, SourceAddress>>,
}

impl SourceRotationMiddleware {
    /// Create the middleware from `config`, loading every address source.
    pub fn new(config: RotationConfig) -> std::result::Result<Self, ConfigError> {
        if let Some(rps) = config.max_requests_per_second {
            source::rate_quota(rps)?;
        }

        let addresses = config.load_addresses()?;
        if addresses.is_empty() {
            warn!("No local addresses configured, requests use the default route");
        } else {
            info!("Source rotation initialized with {} local addresses", addresses.len());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                pool: AddressPool::with_addresses(addresses),
                config,
                sources: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Replace the local addresses used for rotation.
    ///
    /// Addresses that stay in the pool keep their client and rate limiter.
    pub fn set_outgoing_addresses(&self, addresses: impl IntoIterator<Item = IpAddr>) {
        let addresses: Vec<IpAddr> = addresses.into_iter().collect();
        self.inner
            .sources
            .write()
            .retain(|address, _| addresses.contains(address));
        self.inner.pool.set_outgoing_addresses(addresses);
    }

    pub fn pool(&self) -> &AddressPool {
        &self.inner.pool
    }

    /// Get the cached source for `address`, building it on first use.
    fn source_for(&self, address: IpAddr) -> std::result::Result<SourceAddress, ConfigError> {
        if let Some(source) = self.inner.sources.read().get(&address) {
            return Ok(source.clone());
        }

        let mut sources = self.inner.sources.write();
        if let Some(source) = sources.get(&address) {
            return Ok(source.clone());
        }
        debug!("Building client bound to {}", address);
        let source = SourceAddress::new(address, &self.inner.config)?;
        sources.insert(address, source.clone());
        Ok(source)
    }
}

#[async_trait]
impl Middleware for SourceRotationMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let Some(address) = self.inner.pool.next_local_address() else {
            return next.run(req, extensions).await;
        };

        let source = self
            .source_for(address)
            .with_context(|| format!("failed to build client bound to {address}"))
            .map_err(Error::Middleware)?;

        source.until_ready().await;

        let url = req.url().clone();
        debug!("Sending {} {} from {}", req.method(), url, address);
        match source.client.execute(req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!("Request to {} from {} failed: {}", url, address, err);
                Err(Error::Reqwest(err))
            }
        }
    }
}
