//! HTTP transport for signed S3 requests

use crate::{
    net::{RoundRobinDns, dialer::RoundRobin},
    s3::error::ApiError,
};
use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::{
    Client, Method, Response,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use std::{collections::BTreeMap, net::IpAddr, sync::Arc};
use url::Url;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Pool of reqwest clients, one per local address, used in turn
#[derive(Debug, Clone)]
pub struct Transport {
    clients: Arc<RoundRobin<Client>>,
}

impl Transport {
    /// # Errors
    ///
    /// Will return `Err` if the TLS backend can't be initialized
    pub fn new() -> Result<Self> {
        TransportBuilder::default().build()
    }

    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// # Errors
    ///
    /// Will return `Err` if a header is invalid or the request can't be sent
    pub async fn request(
        &self,
        url: Url,
        method: Method,
        headers: &BTreeMap<String, String>,
        body: Option<Bytes>,
    ) -> Result<Response, ApiError> {
        let headers = headers
            .iter()
            .map(|(k, v)| {
                Ok((
                    k.parse::<HeaderName>()
                        .with_context(|| format!("invalid header name: {k}"))?,
                    v.parse::<HeaderValue>()
                        .with_context(|| format!("invalid value for header {k}"))?,
                ))
            })
            .collect::<Result<HeaderMap>>()?;

        let client = self.clients.pick().cloned().unwrap_or_default();

        let request = client.request(method, url).headers(headers);
        let request = match body {
            Some(body) => request.body(body),
            None => request,
        };

        Ok(request.send().await?)
    }
}

#[derive(Debug, Default)]
pub struct TransportBuilder {
    dns: Option<RoundRobinDns>,
    local_addresses: Vec<IpAddr>,
}

impl TransportBuilder {
    /// Resolve hosts through a round-robin cache
    #[must_use]
    pub fn dns(mut self, dns: RoundRobinDns) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Spread requests over these local addresses
    #[must_use]
    pub fn local_addresses(mut self, addrs: Vec<IpAddr>) -> Self {
        self.local_addresses = addrs;
        self
    }

    /// # Errors
    ///
    /// Will return `Err` if a client can't be built
    pub fn build(self) -> Result<Transport> {
        let locals: Vec<Option<IpAddr>> = if self.local_addresses.is_empty() {
            vec![None]
        } else {
            self.local_addresses.into_iter().map(Some).collect()
        };

        let clients = locals
            .into_iter()
            .map(|local| {
                let mut builder = Client::builder()
                    .user_agent(APP_USER_AGENT)
                    .local_address(local);
                if let Some(dns) = &self.dns {
                    builder = builder.dns_resolver(Arc::new(dns.clone()));
                }
                builder.build().context("failed to build HTTP client")
            })
            .collect::<Result<Vec<Client>>>()?;

        Ok(Transport {
            clients: Arc::new(RoundRobin::new(clients)),
        })
    }
}
