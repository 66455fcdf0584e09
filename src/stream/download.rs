use crate::{
    error::{S3Operation, TransferError},
    options::{GetObjectMode, Options},
    progress::{ProgressEmitter, TransferKind, TransferRequest},
    s3::api::{ByteStream, Checksums, ObjectMetadata, S3Api},
    stream::{
        body::ObjectBody,
        cancellable,
        get_object::{GetObjectInput, GetObjectOutput},
        range::ByteRange,
        reader::{ChunkPlan, ConcurrentReader, Fetcher},
    },
};
use bytesize::ByteSize;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a download will be split, decided from the planning `HeadObject`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPlan {
    pub chunks: ChunkPlan,
    /// bytes of the object that will be read
    pub range: ByteRange,
    pub part_size: u64,
    pub total_parts: u64,
    /// chunks the reader holds at most
    pub capacity: u64,
}

impl DownloadPlan {
    /// # Errors
    ///
    /// Will return `Err` if the requested range is not within the object
    pub fn new(
        head: &ObjectMetadata,
        range: Option<&str>,
        options: &Options,
    ) -> Result<Self, TransferError> {
        let total = head.total_length();

        let (chunks, range, part_size, total_parts) = match options.get_object_mode {
            GetObjectMode::Part => {
                let part_size = head.content_length.max(1);
                let parts = u64::from(head.parts_count.unwrap_or(1).max(1));
                (ChunkPlan::Parts, ByteRange::new(0, total), part_size, parts)
            }
            GetObjectMode::Range => {
                let range = match range {
                    Some(range) => ByteRange::parse(range, total)?,
                    None => ByteRange::new(0, total),
                };
                let part_size = options.part_size.max(1);
                (
                    ChunkPlan::Ranges { range, part_size },
                    range,
                    part_size,
                    range.chunks(part_size),
                )
            }
        };

        let capacity = (options.get_buffer_size / part_size)
            .max(1)
            .min(total_parts);

        Ok(Self {
            chunks,
            range,
            part_size,
            total_parts,
            capacity,
        })
    }
}

/// Yield an `Interrupted` error once `cancel` fires
fn cancellable_body(body: ByteStream, cancel: CancellationToken) -> ByteStream {
    stream::unfold(Some((body, cancel)), |state| async move {
        let (mut body, cancel) = state?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Some((Err(TransferError::Cancelled.into_io()), None)),
            item = body.next() => item.map(|item| (item, Some((body, cancel)))),
        }
    })
    .boxed()
}

/// Download one object, in a single `GetObject` or in concurrent chunks
pub struct Downloader {
    api: Arc<dyn S3Api>,
    options: Options,
}

impl Downloader {
    #[must_use]
    pub fn new(api: Arc<dyn S3Api>, options: Options) -> Self {
        Self { api, options }
    }

    /// # Errors
    ///
    /// Will return `Err` if the options are invalid, the range is not within
    /// the object or the planning request fails. Errors while reading are
    /// returned by the body.
    pub async fn download(self, input: GetObjectInput) -> Result<GetObjectOutput, TransferError> {
        let progress = Arc::new(ProgressEmitter::new(
            TransferRequest {
                kind: TransferKind::Download,
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                version_id: input.version_id.clone(),
                range: input.range.clone(),
            },
            self.options.progress_listeners.clone(),
        ));

        match self.run(input, &progress).await {
            Ok(output) => Ok(output),
            Err(err) => {
                log::error!("download of {} failed: {err}", progress.request().key);
                progress.start(None);
                progress.failed(&err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        input: GetObjectInput,
        progress: &Arc<ProgressEmitter>,
    ) -> Result<GetObjectOutput, TransferError> {
        self.options.validate()?;

        let checksum_mode = input.checksum_mode || !self.options.disable_checksum_validation;
        let mode = self.options.get_object_mode;

        // part numbers and byte ranges in part mode go out as they are
        if input.part_number.is_some() || (input.range.is_some() && mode == GetObjectMode::Part) {
            return self.single(&input, checksum_mode, progress).await;
        }

        let head_part = (mode == GetObjectMode::Part).then_some(1);
        let head = cancellable(
            &input.cancellation,
            self.api
                .head_object(input.head_object_request(head_part, checksum_mode)),
        )
        .await?
        .map_err(|e| TransferError::s3(S3Operation::HeadObject, e))?;

        let total = head.total_length();
        if total == 0 {
            return self.single(&input, checksum_mode, progress).await;
        }

        let plan = DownloadPlan::new(&head, input.range.as_deref(), &self.options)?;

        log::debug!(
            "Starting download:
        bucket: {}
        key: {}
        mode: {mode:?}
        range: {}
        part size: {}
        parts: {}
        section capacity: {}",
            input.bucket,
            input.key,
            plan.range,
            ByteSize(plan.part_size),
            plan.total_parts,
            plan.capacity,
        );

        let total_parts = usize::try_from(plan.total_parts).map_err(|_| {
            TransferError::Configuration(format!("{} parts are too many", plan.total_parts))
        })?;
        let capacity = usize::try_from(plan.capacity).unwrap_or(total_parts);

        // without a version the etag pins the object that was planned
        let if_match = input.conditions.if_match.clone().or_else(|| {
            if input.version_id.is_none() {
                head.etag.clone()
            } else {
                None
            }
        });

        let mut template = input.get_object_request(checksum_mode);
        template.part_number = None;
        template.range = None;
        template.conditions.if_match = if_match;

        let mut metadata = head;
        metadata.content_length = plan.range.len();
        metadata.content_range = (mode == GetObjectMode::Range && input.range.is_some())
            .then(|| plan.range.content_range(total));
        // part 1 checksums don't describe the whole object
        if mode == GetObjectMode::Part && metadata.parts_count.unwrap_or(1) > 1 {
            metadata.checksums = Checksums::default();
        }

        let reader = ConcurrentReader::spawn(
            Fetcher {
                api: self.api.clone(),
                template,
                max_retries: self.options.part_body_max_retries,
                cancel: input.cancellation.child_token(),
            },
            plan.chunks,
            total_parts,
            capacity,
            self.options.concurrency,
        );

        progress.start(Some(metadata.content_length));

        Ok(GetObjectOutput {
            metadata: metadata.clone(),
            body: ObjectBody::concurrent(reader, metadata, progress.clone()),
        })
    }

    async fn single(
        &self,
        input: &GetObjectInput,
        checksum_mode: bool,
        progress: &Arc<ProgressEmitter>,
    ) -> Result<GetObjectOutput, TransferError> {
        log::debug!(
            "GetObject {}/{} part: {:?} range: {:?}",
            input.bucket,
            input.key,
            input.part_number,
            input.range
        );

        let response = cancellable(
            &input.cancellation,
            self.api.get_object(input.get_object_request(checksum_mode)),
        )
        .await?
        .map_err(|e| TransferError::s3(S3Operation::GetObject, e))?;

        progress.start(Some(response.metadata.content_length));

        let body = cancellable_body(response.body, input.cancellation.clone());

        Ok(GetObjectOutput {
            metadata: response.metadata.clone(),
            body: ObjectBody::stream(body, response.metadata, progress.clone()),
        })
    }
}
