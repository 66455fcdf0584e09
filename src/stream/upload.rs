// https://docs.aws.amazon.com/AmazonS3/latest/dev/UsingRESTAPImpUpload.html
// * Initiate Multipart Upload
// * Upload Part
// * Complete Multipart Upload
use crate::{
    error::{S3Operation, TransferError},
    options::Options,
    progress::{ProgressEmitter, TransferRequest, TransferResult},
    s3::{
        api::{AbortMultipartUploadRequest, CompletedPart, S3Api},
        checksum::{Checksum, ChecksumAlgorithm},
    },
    stream::{
        cancellable,
        pool::{BufferPool, PoolError, PooledBuffer},
        put_object::{MultipartTarget, PutObjectInput, PutObjectOutput},
    },
};
use bytesize::ByteSize;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinError};
use tokio_util::sync::CancellationToken;

/// Part size that keeps an object of `length` bytes within `max_parts` parts
#[must_use]
pub fn part_size_for(length: Option<u64>, part_size: u64, max_parts: u32) -> u64 {
    match length {
        Some(length) if length / part_size >= u64::from(max_parts) => {
            length.div_ceil(u64::from(max_parts)) + 1
        }
        _ => part_size,
    }
}

struct Chunk {
    part_number: u32,
    buffer: PooledBuffer,
}

#[derive(Default)]
struct UploadState {
    parts: Vec<CompletedPart>,
    error: Option<TransferError>,
}

/// State shared by the driver and the workers of one multipart upload
struct Shared {
    target: MultipartTarget,
    state: Mutex<UploadState>,
    progress: Arc<ProgressEmitter>,
    cancel: CancellationToken,
}

impl Shared {
    /// Keep the first error and stop everyone else
    fn fail(&self, err: TransferError) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            log::error!("upload {} failed: {err}", self.target.upload_id);
            state.error = Some(err);
        } else {
            log::debug!("dropping error after first failure: {err}");
        }
        drop(state);
        self.cancel.cancel();
    }

    fn failed(&self) -> bool {
        self.state.lock().error.is_some()
    }
}

fn pool_error(err: PoolError) -> TransferError {
    match err {
        PoolError::Cancelled | PoolError::Closed => TransferError::Cancelled,
    }
}

/// Upload one object, in a single `PutObject` or in parts
pub struct Uploader {
    api: Arc<dyn S3Api>,
    options: Options,
}

impl Uploader {
    #[must_use]
    pub fn new(api: Arc<dyn S3Api>, options: Options) -> Self {
        Self { api, options }
    }

    /// # Errors
    ///
    /// Will return `Err` if the options are invalid, the body can't be read or
    /// any S3 call fails. Failures after `CreateMultipartUpload` carry the
    /// upload id.
    pub async fn upload(self, mut input: PutObjectInput) -> Result<PutObjectOutput, TransferError> {
        let progress = Arc::new(ProgressEmitter::new(
            TransferRequest::upload(&input.bucket, &input.key),
            self.options.progress_listeners.clone(),
        ));

        let length = input.content_length();
        progress.start(length);

        match self.run(&mut input, length, &progress).await {
            Ok(output) => {
                progress.complete(TransferResult::Upload(&output));
                Ok(output)
            }
            Err(err) => {
                progress.failed(&err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        input: &mut PutObjectInput,
        length: Option<u64>,
        progress: &Arc<ProgressEmitter>,
    ) -> Result<PutObjectOutput, TransferError> {
        self.options.validate()?;

        let algorithm = input
            .checksum_algorithm
            .unwrap_or(self.options.checksum_algorithm);

        let part_size = part_size_for(length, self.options.part_size, self.options.max_parts);
        if part_size != self.options.part_size {
            log::info!(
                "part size raised from {} to {} to fit {} parts",
                ByteSize(self.options.part_size),
                ByteSize(part_size),
                self.options.max_parts
            );
        }

        log::debug!(
            "Starting upload:
        bucket: {}
        key: {}
        length: {:?}
        part size: {}
        concurrency: {}
        checksum: {algorithm}",
            input.bucket,
            input.key,
            length,
            ByteSize(part_size),
            self.options.concurrency,
        );

        let cancel = input.cancellation.clone();

        // known small bodies go in one request regardless of the part size
        if length.is_some_and(|length| length < self.options.multipart_threshold) {
            let body = cancellable(&cancel, input.body.read_all())
                .await?
                .map_err(TransferError::Read)?;
            return self.single(input, &body, algorithm, progress).await;
        }

        let part_size = usize::try_from(part_size).map_err(|_| {
            TransferError::Configuration(format!("part size {part_size} is too large"))
        })?;
        let pool = BufferPool::new(part_size, self.options.concurrency + 1);

        let mut first = pool.get(&cancel).await.map_err(pool_error)?;
        cancellable(&cancel, input.body.read_chunk(&mut first))
            .await?
            .map_err(TransferError::Read)?;

        if !first.is_full() {
            return self.single(input, &first, algorithm, progress).await;
        }

        // only commit to multipart once a second non empty chunk exists
        let mut second = pool.get(&cancel).await.map_err(pool_error)?;
        let read = cancellable(&cancel, input.body.read_chunk(&mut second))
            .await?
            .map_err(TransferError::Read)?;

        if read == 0 {
            drop(second);
            return self.single(input, &first, algorithm, progress).await;
        }

        self.multipart(input, algorithm, pool, vec![first, second], progress)
            .await
    }

    async fn single(
        &self,
        input: &PutObjectInput,
        body: &[u8],
        algorithm: ChecksumAlgorithm,
        progress: &ProgressEmitter,
    ) -> Result<PutObjectOutput, TransferError> {
        log::debug!("PutObject {}/{} ({} bytes)", input.bucket, input.key, body.len());

        let request = input.put_object_request(body, algorithm);
        let response = cancellable(&input.cancellation, self.api.put_object(request))
            .await?
            .map_err(|e| TransferError::s3(S3Operation::PutObject, e))?;

        progress.add(body.len() as u64);

        log::info!(
            "Upload finished, key: {}, ETag: {}",
            input.key,
            response.etag.as_deref().unwrap_or_default()
        );

        Ok(PutObjectOutput::from_put(input, response))
    }

    async fn multipart(
        &self,
        input: &mut PutObjectInput,
        algorithm: ChecksumAlgorithm,
        pool: BufferPool,
        read_ahead: Vec<PooledBuffer>,
        progress: &Arc<ProgressEmitter>,
    ) -> Result<PutObjectOutput, TransferError> {
        let created = cancellable(
            &input.cancellation,
            self.api
                .create_multipart_upload(input.create_multipart_upload_request(algorithm)),
        )
        .await?
        .map_err(|e| TransferError::s3(S3Operation::CreateMultipartUpload, e))?;

        log::debug!("upload_id: {}", created.upload_id);

        let shared = Arc::new(Shared {
            target: MultipartTarget {
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                upload_id: created.upload_id.clone(),
                checksum_algorithm: algorithm,
                fields: input.fields.clone(),
            },
            state: Mutex::new(UploadState::default()),
            progress: progress.clone(),
            cancel: input.cancellation.child_token(),
        });

        let (tx, rx) = mpsc::channel::<Chunk>(self.options.concurrency);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        log::info!("Max concurrent requests: {}", self.options.concurrency);

        let workers: Vec<_> = (0..self.options.concurrency)
            .map(|_| tokio::spawn(worker(self.api.clone(), shared.clone(), rx.clone())))
            .collect();

        let sent = self.drive(input, &shared, &pool, read_ahead, &tx).await;
        drop(tx);

        for handle in workers {
            if let Some(err) = handle.await.err().filter(JoinError::is_panic) {
                std::panic::resume_unwind(err.into_panic());
            }
        }
        pool.close();

        let (mut parts, error) = {
            let mut state = shared.state.lock();
            (std::mem::take(&mut state.parts), state.error.take())
        };

        // the caller's token fires without any worker recording it
        let error = error.or_else(|| {
            input
                .cancellation
                .is_cancelled()
                .then_some(TransferError::Cancelled)
        });

        if let Some(err) = error {
            return Err(self.abort(&shared.target, err).await);
        }

        parts.sort_by_key(|part| part.part_number);

        let contiguous = parts
            .iter()
            .zip(1..)
            .all(|(part, number)| part.part_number == number);
        if !contiguous || u32::try_from(parts.len()).ok() != Some(sent) {
            let err = TransferError::Configuration(format!(
                "expected {sent} uploaded parts, got {}",
                parts.len()
            ));
            return Err(self.abort(&shared.target, err).await);
        }

        let completed = cancellable(
            &input.cancellation,
            self.api
                .complete_multipart_upload(shared.target.complete_request(parts.clone())),
        )
        .await
        .and_then(|r| r.map_err(|e| TransferError::s3(S3Operation::CompleteMultipartUpload, e)));

        match completed {
            Ok(response) => {
                log::info!(
                    "Upload finished, key: {}, ETag: {}",
                    shared.target.key,
                    response.etag.as_deref().unwrap_or_default()
                );
                Ok(PutObjectOutput::from_complete(
                    &shared.target,
                    parts,
                    response,
                    created.encryption,
                ))
            }
            Err(err) => Err(self.abort(&shared.target, err).await),
        }
    }

    /// Feed chunks to the workers, returns the number of parts sent
    async fn drive(
        &self,
        input: &mut PutObjectInput,
        shared: &Shared,
        pool: &BufferPool,
        read_ahead: Vec<PooledBuffer>,
        tx: &mpsc::Sender<Chunk>,
    ) -> u32 {
        let cancel = &shared.cancel;
        let mut read_ahead = read_ahead.into_iter();
        let mut part_number: u32 = 0;

        loop {
            if shared.failed() || cancel.is_cancelled() {
                break;
            }

            let buffer = if let Some(buffer) = read_ahead.next() {
                buffer
            } else {
                let mut buffer = match pool.get(cancel).await {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        shared.fail(pool_error(err));
                        break;
                    }
                };

                match cancellable(cancel, input.body.read_chunk(&mut buffer)).await {
                    Ok(Ok(_)) => buffer,
                    Ok(Err(err)) => {
                        shared.fail(TransferError::Read(err));
                        break;
                    }
                    Err(err) => {
                        shared.fail(err);
                        break;
                    }
                }
            };

            // the body ended on a part boundary
            if buffer.is_empty() {
                break;
            }

            if part_number >= self.options.max_parts {
                shared.fail(TransferError::PartLimitExceeded {
                    max_parts: self.options.max_parts,
                });
                break;
            }
            part_number += 1;

            let last = !buffer.is_full();
            let chunk = Chunk {
                part_number,
                buffer,
            };

            if let Err(err) = cancellable(cancel, tx.send(chunk)).await {
                shared.fail(err);
                break;
            }

            if last {
                break;
            }
        }

        part_number
    }

    /// Abort after a failure, folding any abort error into the first one
    async fn abort(&self, target: &MultipartTarget, err: TransferError) -> TransferError {
        log::warn!(
            "aborting multipart upload {} of {}: {err}",
            target.upload_id,
            target.key
        );

        let request = AbortMultipartUploadRequest {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            upload_id: target.upload_id.clone(),
            fields: target.fields.clone(),
        };

        let source = match self.api.abort_multipart_upload(request).await {
            Ok(()) => err,
            Err(abort) => {
                log::error!("failed to abort multipart upload {}: {abort}", target.upload_id);
                TransferError::AbortFailed {
                    abort,
                    source: Box::new(err),
                }
            }
        };

        TransferError::MultipartUpload {
            upload_id: target.upload_id.clone(),
            source: Box::new(source),
        }
    }
}

async fn worker(
    api: Arc<dyn S3Api>,
    shared: Arc<Shared>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Chunk>>>,
) {
    loop {
        let chunk = { rx.lock().await.recv().await };
        let Some(chunk) = chunk else {
            break;
        };

        // drain without uploading once the upload failed
        if shared.failed() || shared.cancel.is_cancelled() {
            continue;
        }

        let part_number = chunk.part_number;
        let request = shared
            .target
            .upload_part_request(part_number, &chunk.buffer);

        match cancellable(&shared.cancel, api.upload_part(request)).await {
            Ok(Ok(response)) => {
                let algorithm = shared.target.checksum_algorithm;
                let checksum = response
                    .checksums
                    .get(algorithm)
                    .map(|value| Checksum::new(algorithm, value.to_string()));

                log::info!("Uploaded part: {part_number}, etag: {}", response.etag);

                shared.state.lock().parts.push(CompletedPart {
                    part_number,
                    etag: response.etag,
                    checksum,
                });
                shared.progress.add(chunk.buffer.len() as u64);
            }
            Ok(Err(err)) => shared.fail(TransferError::s3(S3Operation::UploadPart(part_number), err)),
            Err(err) => shared.fail(err),
        }
    }
}
