//! Connection helpers composed onto the HTTP client

pub mod dialer;
pub mod dns;
pub mod singleflight;

pub use self::{
    dialer::{Dialer, RotoDialer, TcpDialer},
    dns::{DnsCache, Lookup, RoundRobinDns, SystemLookup},
};
