//! Round-robin DNS
//!
//! Each host is resolved once per TTL, successive dials then walk its
//! addresses in turn so that connections spread over every address the
//! load balancer publishes. Concurrent misses for the same host share one
//! lookup.

use crate::net::{
    dialer::{Dialer, TcpDialer},
    singleflight::Group,
};
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use schnellru::{ByLength, LruMap};
use std::{
    fmt, io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_CACHE_SIZE: u32 = 512;

/// Source of "now" for TTL checks
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("failed to resolve {host}: {message}")]
    Lookup { host: String, message: String },

    #[error("no addresses found for {0}")]
    NoAddresses(String),
}

impl From<DnsError> for io::Error {
    fn from(err: DnsError) -> Self {
        Self::other(err)
    }
}

#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if !addrs.contains(&addr.ip()) {
                addrs.push(addr.ip());
            }
        }
        Ok(addrs)
    }
}

struct Entry {
    addrs: Vec<IpAddr>,
    expires: Instant,
    next: usize,
}

/// Fixed capacity LRU of host addresses, expired entries are treated as
/// missing
pub struct DnsCache {
    entries: Mutex<LruMap<String, Entry, ByLength>>,
    ttl: Duration,
    clock: Clock,
}

impl fmt::Debug for DnsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl DnsCache {
    #[must_use]
    pub fn new(capacity: u32, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(Instant::now))
    }

    #[must_use]
    pub fn with_clock(capacity: u32, ttl: Duration, clock: Clock) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(ByLength::new(capacity.max(1)))),
            ttl,
            clock,
        }
    }

    /// Next address of `host` and advance its rotation
    pub fn get(&self, host: &str) -> Option<IpAddr> {
        self.rotate(host, |addrs, next| addrs.get(next).copied())
    }

    /// Every address of `host`, starting at the one [`Self::get`] would
    /// return, and advance the rotation once
    pub fn get_all(&self, host: &str) -> Option<Vec<IpAddr>> {
        self.rotate(host, |addrs, next| {
            let mut rotated = addrs.to_vec();
            rotated.rotate_left(next);
            Some(rotated)
        })
    }

    fn rotate<T>(&self, host: &str, pick: impl FnOnce(&[IpAddr], usize) -> Option<T>) -> Option<T> {
        let now = (self.clock)();
        let mut entries = self.entries.lock();

        let expired = now >= entries.peek(host)?.expires;
        if expired {
            entries.remove(host);
            return None;
        }

        let entry = entries.get(host)?;
        let picked = pick(&entry.addrs, entry.next)?;
        entry.next = (entry.next + 1) % entry.addrs.len();
        Some(picked)
    }

    /// Store the addresses of `host` for one TTL, an empty list is ignored
    pub fn set(&self, host: &str, addrs: Vec<IpAddr>) {
        if addrs.is_empty() {
            return;
        }

        let entry = Entry {
            addrs,
            expires: (self.clock)() + self.ttl,
            next: 0,
        };
        self.entries.lock().insert(host.to_string(), entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type LookupResult = Result<Vec<IpAddr>, DnsError>;

struct Inner<D> {
    cache: Arc<DnsCache>,
    lookups: Group<LookupResult>,
    resolver: Arc<dyn Lookup>,
    dialer: D,
}

/// Caching round-robin resolver wrapping a [`Dialer`]
pub struct RoundRobinDns<D = TcpDialer> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for RoundRobinDns<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D> fmt::Debug for RoundRobinDns<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundRobinDns")
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl RoundRobinDns<TcpDialer> {
    #[must_use]
    pub fn new(capacity: u32, ttl: Duration) -> Self {
        Self::with_parts(DnsCache::new(capacity, ttl), Arc::new(SystemLookup), TcpDialer)
    }
}

impl Default for RoundRobinDns<TcpDialer> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE, DEFAULT_TTL)
    }
}

impl<D: Dialer> RoundRobinDns<D> {
    #[must_use]
    pub fn with_parts(cache: DnsCache, resolver: Arc<dyn Lookup>, dialer: D) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: Arc::new(cache),
                lookups: Group::new(),
                resolver,
                dialer,
            }),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &DnsCache {
        &self.inner.cache
    }

    // one lookup per host at a time, every waiter gets the fresh records
    async fn refresh(&self, host: &str) -> LookupResult {
        let cache = self.inner.cache.clone();
        let resolver = self.inner.resolver.clone();
        let name = host.to_string();

        self.inner
            .lookups
            .work(host, move || async move {
                debug!("resolving {name}");
                let addrs = resolver
                    .lookup(&name)
                    .await
                    .map_err(|e| DnsError::Lookup {
                        host: name.clone(),
                        message: e.to_string(),
                    })?;
                if addrs.is_empty() {
                    return Err(DnsError::NoAddresses(name));
                }
                debug!("{name} resolved to {addrs:?}");
                cache.set(&name, addrs.clone());
                Ok(addrs)
            })
            .await
    }

    /// Next address of `host`, resolving it when missing or expired
    ///
    /// # Errors
    ///
    /// Will return `Err` if the lookup fails or returns no addresses
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, DnsError> {
        if let Some(addr) = self.inner.cache.get(host) {
            return Ok(addr);
        }

        let addrs = self.refresh(host).await?;
        // the entry may already be gone again with a zero or tiny ttl
        self.inner
            .cache
            .get(host)
            .or_else(|| addrs.first().copied())
            .ok_or_else(|| DnsError::NoAddresses(host.to_string()))
    }

    /// Every address of `host`, rotated to start at the next one
    ///
    /// # Errors
    ///
    /// Will return `Err` if the lookup fails or returns no addresses
    pub async fn resolve_all(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        if let Some(addrs) = self.inner.cache.get_all(host) {
            return Ok(addrs);
        }

        let addrs = self.refresh(host).await?;
        Ok(self.inner.cache.get_all(host).unwrap_or(addrs))
    }

    /// Dial `host:port` through the next cached address of `host`
    ///
    /// # Errors
    ///
    /// Will return `Err` if the address is malformed, the host can't be
    /// resolved or the wrapped dialer fails
    pub async fn dial(&self, addr: &str) -> io::Result<D::Conn> {
        let (host, port) = split_host_port(addr)?;

        let ip = match host.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => self.resolve(host).await?,
        };

        let target = SocketAddr::new(ip, port);
        debug!("dialing {addr} via {target}");

        self.inner.dialer.dial(target).await.inspect_err(|e| {
            warn!("dial {target} for {addr} failed: {e}");
        })
    }
}

impl<D: Dialer + 'static> Resolve for RoundRobinDns<D> {
    fn resolve(&self, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let addrs = this
                .resolve_all(name.as_str())
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            let addrs: Addrs = Box::new(addrs.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

/// Split `host:port`, IPv6 hosts are expected in brackets
///
/// # Errors
///
/// Will return `Err` if the port is missing or not a number
pub fn split_host_port(addr: &str) -> io::Result<(&str, u16)> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidInput, format!("invalid address: {addr}"));

    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host, port))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn manual_clock() -> (Arc<Mutex<Instant>>, Clock) {
        let now = Arc::new(Mutex::new(Instant::now()));
        let handle = now.clone();
        (now, Arc::new(move || *handle.lock()))
    }

    #[test]
    fn test_split_host_port() {
        let test = vec![
            ("example.com:443", Some(("example.com", 443))),
            ("10.0.0.1:80", Some(("10.0.0.1", 80))),
            ("[::1]:9000", Some(("::1", 9000))),
            ("example.com", None),
            ("example.com:http", None),
            (":80", None),
        ];
        for (addr, expected) in test {
            assert_eq!(split_host_port(addr).ok(), expected, "{addr}");
        }
    }

    #[test]
    fn test_cache_rotation() {
        let cache = DnsCache::new(8, DEFAULT_TTL);
        assert!(cache.get("host").is_none());

        cache.set("host", vec![ip(1), ip(2), ip(3)]);
        let seen: Vec<IpAddr> = (0..6).filter_map(|_| cache.get("host")).collect();
        assert_eq!(seen, vec![ip(1), ip(2), ip(3), ip(1), ip(2), ip(3)]);

        assert_eq!(cache.get_all("host").unwrap(), vec![ip(1), ip(2), ip(3)]);
        assert_eq!(cache.get_all("host").unwrap(), vec![ip(2), ip(3), ip(1)]);
        assert_eq!(cache.get("host"), Some(ip(3)));
    }

    #[test]
    fn test_cache_ttl() {
        let (now, clock) = manual_clock();
        let cache = DnsCache::with_clock(8, Duration::from_secs(30), clock);
        cache.set("host", vec![ip(1)]);

        *now.lock() += Duration::from_secs(29);
        assert_eq!(cache.get("host"), Some(ip(1)));

        *now.lock() += Duration::from_secs(1);
        assert!(cache.get("host").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = DnsCache::new(2, DEFAULT_TTL);
        cache.set("a", vec![ip(1)]);
        cache.set("b", vec![ip(2)]);
        // touch "a" so that "b" is the least recently used
        assert!(cache.get("a").is_some());
        cache.set("c", vec![ip(3)]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(ip(1)));
        assert_eq!(cache.get("c"), Some(ip(3)));
    }

    #[test]
    fn test_cache_ignores_empty() {
        let cache = DnsCache::new(2, DEFAULT_TTL);
        cache.set("a", Vec::new());
        assert!(cache.is_empty());
    }
}
