use crate::{
    error::TransferError,
    progress::{ProgressEmitter, TransferResult},
    s3::api::{ByteStream, ObjectMetadata},
    stream::{pool::PooledBuffer, reader::ConcurrentReader},
};
use bytes::Bytes;
use std::{
    fmt, io,
    io::{Cursor, SeekFrom},
    path::Path,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tokio_util::io::StreamReader;

/// The content of an upload, read once from start to end
pub struct UploadBody {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    length: Option<u64>,
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl Default for UploadBody {
    fn default() -> Self {
        Self::from(Bytes::new())
    }
}

impl From<Bytes> for UploadBody {
    fn from(bytes: Bytes) -> Self {
        let length = bytes.len() as u64;
        Self {
            reader: Box::new(Cursor::new(bytes)),
            length: Some(length),
        }
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for UploadBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(bytes))
    }
}

impl UploadBody {
    /// A body of unknown length
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            length: None,
        }
    }

    /// A body whose length the caller knows
    pub fn with_length<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            length: Some(length),
        }
    }

    /// A seekable body, its remaining length is measured up front
    ///
    /// # Errors
    ///
    /// Will return `Err` if the reader can't seek
    pub async fn seekable<R>(mut reader: R) -> io::Result<Self>
    where
        R: AsyncRead + AsyncSeek + Send + Unpin + 'static,
    {
        let position = reader.stream_position().await?;
        let end = reader.seek(SeekFrom::End(0)).await?;
        reader.seek(SeekFrom::Start(position)).await?;

        Ok(Self::with_length(reader, end.saturating_sub(position)))
    }

    /// # Errors
    ///
    /// Will return `Err` if the file can't be opened
    pub async fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Self::seekable(file).await
    }

    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.length
    }

    /// Fill the buffer until it is full or the body ends, returns the bytes read
    pub(crate) async fn read_chunk(&mut self, buffer: &mut PooledBuffer) -> io::Result<usize> {
        let mut read = 0;

        while !buffer.is_full() {
            let n = self.reader.read(buffer.spare()).await?;
            if n == 0 {
                break;
            }
            buffer.advance(n);
            read += n;
        }

        Ok(read)
    }

    /// Read the whole body into memory
    pub(crate) async fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let capacity = self
            .length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default();
        let mut bytes = Vec::with_capacity(capacity);
        self.reader.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}

enum Source {
    Stream(StreamReader<ByteStream, Bytes>),
    Concurrent(Box<ConcurrentReader>),
}

/// The content of a download
///
/// Reads yield the object bytes in order. Dropping the body before the end
/// cancels any outstanding part requests.
pub struct ObjectBody {
    source: Source,
    metadata: ObjectMetadata,
    progress: Arc<ProgressEmitter>,
    done: bool,
    failed: bool,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Stream(_) => "stream",
            Source::Concurrent(_) => "concurrent",
        };
        f.debug_struct("ObjectBody")
            .field("source", &source)
            .field("done", &self.done)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl ObjectBody {
    /// A body read straight from one `GetObject` response
    pub(crate) fn stream(
        stream: ByteStream,
        metadata: ObjectMetadata,
        progress: Arc<ProgressEmitter>,
    ) -> Self {
        Self {
            source: Source::Stream(StreamReader::new(stream)),
            metadata,
            progress,
            done: false,
            failed: false,
        }
    }

    pub(crate) fn concurrent(
        reader: ConcurrentReader,
        metadata: ObjectMetadata,
        progress: Arc<ProgressEmitter>,
    ) -> Self {
        Self {
            source: Source::Concurrent(Box::new(reader)),
            metadata,
            progress,
            done: false,
            failed: false,
        }
    }

    /// Read the rest of the body into memory
    ///
    /// # Errors
    ///
    /// Will return `Err` if any part of the download fails
    pub async fn collect(mut self) -> io::Result<Vec<u8>> {
        let capacity = usize::try_from(self.metadata.content_length).unwrap_or_default();
        let mut bytes = Vec::with_capacity(capacity);
        self.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    fn poll_source(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), TransferError>> {
        match &mut self.source {
            Source::Stream(reader) => Pin::new(reader).poll_read(cx, buf).map_err(|err| {
                if err.kind() == io::ErrorKind::Interrupted {
                    TransferError::Cancelled
                } else {
                    TransferError::PartBody(err)
                }
            }),
            Source::Concurrent(reader) => reader.poll_read(cx, buf),
        }
    }
}

impl AsyncRead for ObjectBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if buf.remaining() == 0 || this.done {
            return Poll::Ready(Ok(()));
        }

        if this.failed {
            return Poll::Ready(Err(io::Error::other("download already failed")));
        }

        let before = buf.filled().len();

        match this.poll_source(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                let read = buf.filled().len() - before;
                if read == 0 {
                    this.done = true;
                    this.progress
                        .complete(TransferResult::Download(&this.metadata));
                } else {
                    this.progress.add(read as u64);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                log::error!(
                    "download of {} failed: {err}",
                    this.progress.request().key
                );
                this.failed = true;
                this.progress.failed(&err);
                Poll::Ready(Err(err.into_io()))
            }
        }
    }
}

impl Drop for ObjectBody {
    fn drop(&mut self) {
        if self.done || self.failed {
            return;
        }

        // every byte was handed out, only the final empty read is missing
        if self.progress.bytes_transferred() >= self.metadata.content_length {
            self.progress
                .complete(TransferResult::Download(&self.metadata));
        } else {
            self.progress.failed(&TransferError::Cancelled);
        }
    }
}
