//! TCP dialers
//!
//! [`RotoDialer`] binds every new connection to the next address of a list
//! of local addresses, so that traffic leaves through several interfaces in
//! turn.

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::{
    io,
    net::{IpAddr, SocketAddr},
};
use tokio::net::{TcpSocket, TcpStream};

#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: Send;

    async fn dial(&self, addr: SocketAddr) -> io::Result<Self::Conn>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Strict round-robin over a fixed list
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    next: Mutex<usize>,
}

impl<T> RoundRobin<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next: Mutex::new(0),
        }
    }

    /// Next item, `None` only when the list is empty
    pub fn pick(&self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }

        let mut next = self.next.lock();
        let item = self.items.get(*next);
        *next = (*next + 1) % self.items.len();
        item
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[derive(Debug)]
pub struct RotoDialer {
    locals: RoundRobin<IpAddr>,
}

impl RotoDialer {
    #[must_use]
    pub fn new(locals: Vec<IpAddr>) -> Self {
        Self {
            locals: RoundRobin::new(locals),
        }
    }

    /// Local address the next connection will be bound to
    #[must_use]
    pub fn next_local(&self) -> Option<IpAddr> {
        self.locals.pick().copied()
    }
}

#[async_trait]
impl Dialer for RotoDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let Some(local) = self.next_local() else {
            return TcpStream::connect(addr).await;
        };

        debug!("dialing {addr} from {local}");

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(SocketAddr::new(local, 0))?;
        socket.connect(addr).await
    }
}
