//! In order reader over concurrently downloaded chunks
//!
//! A dispatcher hands chunk requests to the workers, but only for chunks
//! inside the current window of `capacity` chunks. The reader moves the
//! window once every chunk in it was read, so no more than `capacity` chunks
//! are ever in flight or buffered.

use crate::{
    error::{S3Operation, TransferError},
    s3::api::{GetObjectRequest, S3Api},
    stream::{cancellable, range::ByteRange},
};
use bytes::{Bytes, BytesMut};
use futures::stream::TryStreamExt;
use std::{
    collections::BTreeMap,
    fmt, io,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::ReadBuf,
    sync::{mpsc, watch},
};
use tokio_util::sync::{CancellationToken, DropGuard};

/// How a chunk is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTarget {
    Part(u32),
    Range(ByteRange),
}

/// How the object is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    /// chunk `i` is part number `i + 1`
    Parts,
    /// chunk `i` is the `i`-th span of `part_size` bytes of the range
    Ranges { range: ByteRange, part_size: u64 },
}

impl ChunkPlan {
    #[must_use]
    pub fn target(&self, index: usize) -> Option<ChunkTarget> {
        match self {
            Self::Parts => u32::try_from(index + 1).ok().map(ChunkTarget::Part),
            Self::Ranges { range, part_size } => range
                .chunk(index as u64, *part_size)
                .map(ChunkTarget::Range),
        }
    }
}

#[derive(Debug)]
struct ChunkRequest {
    index: usize,
    target: ChunkTarget,
}

#[derive(Debug)]
struct ChunkOutput {
    index: usize,
    data: Bytes,
}

type ChunkResult = Result<ChunkOutput, TransferError>;

/// What the workers of one download share
pub(crate) struct Fetcher {
    pub api: Arc<dyn S3Api>,
    /// every chunk request starts from this one
    pub template: GetObjectRequest,
    pub max_retries: u32,
    pub cancel: CancellationToken,
}

impl Fetcher {
    fn request(&self, target: ChunkTarget) -> GetObjectRequest {
        let mut request = self.template.clone();
        match target {
            ChunkTarget::Part(number) => request.part_number = Some(number),
            ChunkTarget::Range(range) => request.range = Some(range.header()),
        }
        request
    }

    /// Get one chunk, a body that fails mid read is requested again
    async fn fetch(&self, target: ChunkTarget) -> Result<Bytes, TransferError> {
        let mut attempt = 0;

        loop {
            let response = cancellable(&self.cancel, self.api.get_object(self.request(target)))
                .await?
                .map_err(|e| TransferError::s3(S3Operation::GetObject, e))?;

            let capacity = usize::try_from(response.metadata.content_length).unwrap_or_default();
            let body = response
                .body
                .try_fold(BytesMut::with_capacity(capacity), |mut data, bytes| async move {
                    data.extend_from_slice(&bytes);
                    Ok(data)
                });

            match cancellable(&self.cancel, body).await? {
                Ok(data) => return Ok(data.freeze()),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Error reading body of {target:?}, retrying {attempt}/{}: {err}",
                        self.max_retries
                    );
                }
                Err(err) => return Err(TransferError::PartBody(err)),
            }
        }
    }
}

async fn dispatch(
    plan: ChunkPlan,
    total: usize,
    requests: mpsc::Sender<ChunkRequest>,
    mut window: watch::Receiver<usize>,
    cancel: CancellationToken,
) {
    for index in 0..total {
        loop {
            let end = *window.borrow_and_update();
            if index < end {
                break;
            }
            if !matches!(cancellable(&cancel, window.changed()).await, Ok(Ok(()))) {
                return;
            }
        }

        let Some(target) = plan.target(index) else {
            return;
        };

        let sent = cancellable(&cancel, requests.send(ChunkRequest { index, target })).await;
        if !matches!(sent, Ok(Ok(()))) {
            return;
        }
        log::debug!("dispatched chunk {index}: {target:?}");
    }
}

async fn worker(
    fetcher: Arc<Fetcher>,
    requests: Arc<tokio::sync::Mutex<mpsc::Receiver<ChunkRequest>>>,
    results: mpsc::Sender<ChunkResult>,
) {
    loop {
        let request = cancellable(&fetcher.cancel, async {
            requests.lock().await.recv().await
        })
        .await;

        let Ok(Some(ChunkRequest { index, target })) = request else {
            break;
        };

        match fetcher.fetch(target).await {
            Ok(data) => {
                if results.send(Ok(ChunkOutput { index, data })).await.is_err() {
                    break;
                }
            }
            Err(TransferError::Cancelled) => break,
            Err(err) => {
                // no more requests once one chunk failed
                fetcher.cancel.cancel();
                let _ = results.send(Err(err)).await;
                break;
            }
        }
    }
}

/// Reassembles chunks in index order
pub struct ConcurrentReader {
    results: mpsc::Receiver<ChunkResult>,
    window: watch::Sender<usize>,
    pending: BTreeMap<usize, Bytes>,
    current: Option<Bytes>,
    read_index: usize,
    window_end: usize,
    capacity: usize,
    total: usize,
    max_buffered: usize,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl fmt::Debug for ConcurrentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentReader")
            .field("read_index", &self.read_index)
            .field("window_end", &self.window_end)
            .field("capacity", &self.capacity)
            .field("total", &self.total)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ConcurrentReader {
    /// Start the dispatcher and the workers of a download of `total` chunks
    pub(crate) fn spawn(
        fetcher: Fetcher,
        plan: ChunkPlan,
        total: usize,
        capacity: usize,
        concurrency: usize,
    ) -> Self {
        let capacity = capacity.clamp(1, total.max(1));
        let cancel = fetcher.cancel.clone();

        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (requests_tx, requests_rx) = mpsc::channel(capacity);
        let (window_tx, window_rx) = watch::channel(capacity.min(total));

        let fetcher = Arc::new(fetcher);
        let requests_rx = Arc::new(tokio::sync::Mutex::new(requests_rx));

        log::debug!(
            "Starting download: chunks: {total}, section capacity: {capacity}, workers: {}",
            concurrency.min(capacity)
        );

        for _ in 0..concurrency.clamp(1, capacity) {
            tokio::spawn(worker(
                fetcher.clone(),
                requests_rx.clone(),
                results_tx.clone(),
            ));
        }
        drop(results_tx);

        tokio::spawn(dispatch(plan, total, requests_tx, window_rx, cancel.clone()));

        Self::new(results_rx, window_tx, capacity, total, cancel)
    }

    fn new(
        results: mpsc::Receiver<ChunkResult>,
        window: watch::Sender<usize>,
        capacity: usize,
        total: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            results,
            window,
            pending: BTreeMap::new(),
            current: None,
            read_index: 0,
            window_end: capacity.min(total),
            capacity,
            total,
            max_buffered: 0,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Most chunks ever held at once
    #[must_use]
    pub const fn max_buffered(&self) -> usize {
        self.max_buffered
    }

    fn finish_chunk(&mut self) {
        self.current = None;
        self.read_index += 1;

        if self.read_index == self.window_end && self.window_end < self.total {
            self.window_end = (self.window_end + self.capacity).min(self.total);
            log::debug!("download window moved to {}", self.window_end);
            self.window.send_replace(self.window_end);
        }
    }

    pub(crate) fn poll_read(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), TransferError>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                if current.is_empty() {
                    self.finish_chunk();
                    continue;
                }

                let n = current.len().min(buf.remaining());
                buf.put_slice(&current.split_to(n));
                if current.is_empty() {
                    self.finish_chunk();
                }
                return Poll::Ready(Ok(()));
            }

            if self.read_index >= self.total {
                return Poll::Ready(Ok(()));
            }

            if let Some(data) = self.pending.remove(&self.read_index) {
                self.current = Some(data);
                continue;
            }

            match self.results.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.pending.insert(chunk.index, chunk.data);
                    self.max_buffered = self.max_buffered.max(self.pending.len());
                }
                Poll::Ready(Some(Err(err))) => {
                    self.cancel.cancel();
                    return Poll::Ready(Err(err));
                }
                Poll::Ready(None) => {
                    return Poll::Ready(Err(if self.cancel.is_cancelled() {
                        TransferError::Cancelled
                    } else {
                        TransferError::PartBody(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("download stopped at chunk {}", self.read_index),
                        ))
                    }));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
