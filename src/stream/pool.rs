use parking_lot::Mutex;
use std::{fmt, mem, ops::Deref, sync::Arc};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer pool wait cancelled")]
    Cancelled,

    #[error("buffer pool closed")]
    Closed,
}

#[derive(Debug, Default)]
struct Slots {
    buffers: Vec<Vec<u8>>,
    closed: bool,
}

struct Inner {
    part_size: usize,
    capacity: usize,
    slots: Mutex<Slots>,
    permits: Semaphore,
}

/// Fixed set of part sized buffers shared by one transfer
///
/// Waiting on [`BufferPool::get`] is what throttles the reader of an upload
/// body to the number of buffers in the pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("part_size", &self.inner.part_size)
            .field("capacity", &self.inner.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl BufferPool {
    #[must_use]
    pub fn new(part_size: usize, capacity: usize) -> Self {
        let buffers = (0..capacity).map(|_| vec![0; part_size]).collect();

        Self {
            inner: Arc::new(Inner {
                part_size,
                capacity,
                slots: Mutex::new(Slots {
                    buffers,
                    closed: false,
                }),
                permits: Semaphore::new(capacity),
            }),
        }
    }

    #[must_use]
    pub fn part_size(&self) -> usize {
        self.inner.part_size
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Buffers currently in the pool
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Buffers currently handed out
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.capacity.saturating_sub(self.available())
    }

    /// Wait for a free buffer
    ///
    /// # Errors
    ///
    /// Will return `Err` if the token is cancelled or the pool is closed
    pub async fn get(&self, cancel: &CancellationToken) -> Result<PooledBuffer, PoolError> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = self.inner.permits.acquire() => permit.map_err(|_| PoolError::Closed)?,
        };

        let buffer = {
            let mut slots = self.inner.slots.lock();
            if slots.closed {
                return Err(PoolError::Closed);
            }
            slots.buffers.pop()
        };

        // the permit travels with the buffer and is restored on return
        permit.forget();

        Ok(PooledBuffer {
            buffer: buffer.unwrap_or_else(|| vec![0; self.inner.part_size]),
            len: 0,
            pool: self.inner.clone(),
        })
    }

    /// Drop idle buffers and fail every waiting and future `get`
    pub fn close(&self) {
        let mut slots = self.inner.slots.lock();
        slots.closed = true;
        slots.buffers.clear();
        self.inner.permits.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.slots.lock().closed
    }
}

/// A buffer on loan from a [`BufferPool`], returned when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    len: usize,
    pool: Arc<Inner>,
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl PooledBuffer {
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// The unfilled tail of the buffer
    pub fn spare(&mut self) -> &mut [u8] {
        self.buffer.get_mut(self.len..).unwrap_or_default()
    }

    /// Mark `n` more bytes of the spare tail as filled
    pub fn advance(&mut self, n: usize) {
        self.len = self.len.saturating_add(n).min(self.capacity());
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.get(..self.len).unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = mem::take(&mut self.buffer);

        let mut slots = self.pool.slots.lock();
        if slots.closed {
            return;
        }
        slots.buffers.push(buffer);
        drop(slots);

        self.pool.permits.add_permits(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_and_return() {
        let pool = BufferPool::new(16, 2);
        let cancel = CancellationToken::new();
        assert_eq!(pool.available(), 2);

        let mut a = pool.get(&cancel).await.unwrap();
        assert_eq!(a.capacity(), 16);
        assert!(a.is_empty());
        a.spare()[..4].copy_from_slice(b"abcd");
        a.advance(4);
        assert_eq!(&a[..], b"abcd");
        assert!(!a.is_full());

        let b = pool.get(&cancel).await.unwrap();
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.outstanding(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.available(), 2);

        // returned buffers come back empty
        let a = pool.get(&cancel).await.unwrap();
        assert!(a.is_empty());
    }

    #[tokio::test]
    async fn test_get_waits_for_return() {
        let pool = BufferPool::new(8, 1);
        let cancel = CancellationToken::new();
        let held = pool.get(&cancel).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.get(&cancel).await.map(|b| b.capacity()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), Ok(8));
    }

    #[tokio::test]
    async fn test_get_cancelled() {
        let pool = BufferPool::new(8, 1);
        let cancel = CancellationToken::new();
        let _held = pool.get(&cancel).await.unwrap();

        cancel.cancel();
        assert_eq!(pool.get(&cancel).await.unwrap_err(), PoolError::Cancelled);
    }

    #[tokio::test]
    async fn test_close() {
        let pool = BufferPool::new(8, 2);
        let cancel = CancellationToken::new();
        let held = pool.get(&cancel).await.unwrap();
        let _other = pool.get(&cancel).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.get(&cancel).await.map(|b| b.capacity()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close();
        assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
        assert!(pool.is_closed());

        // late returns are dropped
        drop(held);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.get(&cancel).await.unwrap_err(), PoolError::Closed);
    }

    #[tokio::test]
    async fn test_full_buffer() {
        let pool = BufferPool::new(4, 1);
        let mut buffer = pool.get(&CancellationToken::new()).await.unwrap();

        buffer.spare().copy_from_slice(b"wxyz");
        buffer.advance(4);
        assert!(buffer.is_full());
        assert!(buffer.spare().is_empty());

        // advancing past the end stays at the capacity
        buffer.advance(10);
        assert_eq!(buffer.len(), 4);
        assert_eq!(&*buffer, b"wxyz");
    }

    #[tokio::test]
    async fn test_outstanding_never_exceeds_capacity() {
        let pool = BufferPool::new(8, 3);
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let pool = pool.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let buffer = pool.get(&cancel).await.unwrap();
                    let outstanding = pool.outstanding();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    drop(buffer);
                    outstanding
                })
            })
            .collect();

        for task in tasks {
            let outstanding = task.await.unwrap();
            assert!((1..=3).contains(&outstanding), "{outstanding}");
        }
        assert_eq!(pool.outstanding(), 0);
    }
}
