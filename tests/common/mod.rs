//! Common test helpers for the transfer integration tests
//!
//! - `MockS3`: an in memory [`S3Api`] that records every call, tracks how
//!   many requests run at once and injects failures
//! - `Recorder`: a progress listener keeping every event
//! - body helpers producing deterministic data

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::StatusCode;
use s3tm::{
    TransferError, TransferRequest, TransferResult,
    progress::ProgressListener,
    s3::{
        ApiError, S3Api,
        api::{
            AbortMultipartUploadRequest, Checksums, CompleteMultipartUploadRequest,
            CompleteMultipartUploadResponse, CreateMultipartUploadRequest,
            CreateMultipartUploadResponse, GetObjectRequest, GetObjectResponse, HeadObjectRequest,
            ObjectMetadata, PutObjectRequest, PutObjectResponse, UploadPartRequest,
            UploadPartResponse,
        },
    },
};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub const MIB: usize = 1024 * 1024;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic bytes, different for every offset within 251 bytes
pub fn data(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PutObject {
        key: String,
        len: usize,
    },
    CreateMultipartUpload {
        key: String,
    },
    UploadPart {
        upload_id: String,
        part_number: u32,
        len: usize,
    },
    CompleteMultipartUpload {
        upload_id: String,
        parts: Vec<u32>,
    },
    AbortMultipartUpload {
        upload_id: String,
    },
    HeadObject {
        part_number: Option<u32>,
    },
    GetObject {
        part_number: Option<u32>,
        range: Option<String>,
        if_match: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Object {
    data: Bytes,
    /// `(start, end)` of every part, empty for single part objects
    parts: Vec<(usize, usize)>,
    etag: String,
    version_id: Option<String>,
}

#[derive(Debug)]
struct Upload {
    key: String,
    parts: BTreeMap<u32, Bytes>,
}

/// Failures the mock injects
#[derive(Debug, Default)]
pub struct Faults {
    /// `UploadPart` of this part number fails
    pub fail_part: Option<u32>,
    pub fail_complete: bool,
    pub fail_abort: bool,
    /// `HeadObject` reports an etag no object has, so `If-Match` fails
    pub stale_head_etag: bool,
    /// this many `GetObject` bodies break halfway
    pub broken_bodies: usize,
    /// time every `UploadPart` and `GetObject` takes
    pub delay: Duration,
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockS3 {
    objects: Mutex<HashMap<String, Object>>,
    uploads: Mutex<HashMap<String, Upload>>,
    calls: Mutex<Vec<Call>>,
    counter: AtomicUsize,
    parts_in_flight: InFlight,
    gets_in_flight: InFlight,
    pub faults: Mutex<Faults>,
}

fn internal_error() -> ApiError {
    ApiError::service(
        StatusCode::INTERNAL_SERVER_ERROR,
        "InternalError",
        "We encountered an internal error. Please try again.",
    )
}

fn parse_range(range: &str, total: usize) -> (usize, usize) {
    let range = range.strip_prefix("bytes=").expect("bytes range");
    let (first, last) = range.split_once('-').expect("first-last");
    let first: usize = first.parse().expect("first");
    let last: usize = last.parse().expect("last");
    (first, (last + 1).min(total))
}

impl MockS3 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn max_parts_in_flight(&self) -> usize {
        self.parts_in_flight.max.load(Ordering::SeqCst)
    }

    pub fn max_gets_in_flight(&self) -> usize {
        self.gets_in_flight.max.load(Ordering::SeqCst)
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Store `data` as an object made of parts of `part_size` bytes
    pub fn insert(&self, key: &str, data: Vec<u8>, part_size: Option<usize>) {
        let parts = match part_size {
            Some(size) => (0..data.len())
                .step_by(size)
                .map(|start| (start, (start + size).min(data.len())))
                .collect(),
            None => Vec::new(),
        };
        let etag = format!("\"etag-{}\"", self.next());
        self.objects.lock().insert(
            key.to_string(),
            Object {
                data: Bytes::from(data),
                parts,
                etag,
                version_id: None,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).map(|object| object.data.clone())
    }

    pub fn object_parts(&self, key: &str) -> usize {
        self.objects
            .lock()
            .get(key)
            .map(|object| object.parts.len())
            .unwrap_or_default()
    }

    pub fn etag(&self, key: &str) -> Option<String> {
        self.objects.lock().get(key).map(|object| object.etag.clone())
    }

    fn find(&self, key: &str) -> Result<Object, ApiError> {
        self.objects.lock().get(key).cloned().ok_or_else(|| {
            ApiError::service(
                StatusCode::NOT_FOUND,
                "NoSuchKey",
                "The specified key does not exist.",
            )
        })
    }

    /// Slice of `object` a request addresses and the metadata describing it
    fn select(
        object: &Object,
        part_number: Option<u32>,
        range: Option<&str>,
    ) -> Result<((usize, usize), ObjectMetadata), ApiError> {
        let total = object.data.len();

        let slice = match (part_number, range) {
            (Some(number), _) if object.parts.is_empty() => {
                if number != 1 {
                    return Err(ApiError::service(
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        "InvalidPartNumber",
                        "The requested partnumber is not satisfiable",
                    ));
                }
                (0, total)
            }
            (Some(number), _) => *object
                .parts
                .get(usize::try_from(number).unwrap() - 1)
                .ok_or_else(|| {
                    ApiError::service(
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        "InvalidPartNumber",
                        "The requested partnumber is not satisfiable",
                    )
                })?,
            (None, Some(range)) => parse_range(range, total),
            (None, None) => (0, total),
        };

        let partial = part_number.is_some() || range.is_some();
        let metadata = ObjectMetadata {
            content_length: u64::try_from(slice.1 - slice.0).unwrap(),
            content_range: (partial && total > 0)
                .then(|| format!("bytes {}-{}/{total}", slice.0, slice.1 - 1)),
            etag: Some(object.etag.clone()),
            version_id: object.version_id.clone(),
            parts_count: (part_number.is_some() && !object.parts.is_empty())
                .then(|| u32::try_from(object.parts.len()).unwrap()),
            content_type: Some("application/octet-stream".to_string()),
            ..ObjectMetadata::default()
        };

        Ok((slice, metadata))
    }
}

#[async_trait]
impl S3Api for MockS3 {
    async fn put_object(
        &self,
        request: PutObjectRequest<'_>,
    ) -> Result<PutObjectResponse, ApiError> {
        self.record(Call::PutObject {
            key: request.key.clone(),
            len: request.body.len(),
        });
        self.insert(&request.key, request.body.to_vec(), None);

        let mut checksums = Checksums::default();
        if let Some(algorithm) = request.checksum_algorithm {
            checksums.set(algorithm, algorithm.compute(request.body));
        }

        Ok(PutObjectResponse {
            etag: self.etag(&request.key),
            checksums,
            ..PutObjectResponse::default()
        })
    }

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, ApiError> {
        self.record(Call::CreateMultipartUpload {
            key: request.key.clone(),
        });
        let upload_id = format!("upload-{}", self.next());
        self.uploads.lock().insert(
            upload_id.clone(),
            Upload {
                key: request.key,
                parts: BTreeMap::new(),
            },
        );
        Ok(CreateMultipartUploadResponse {
            upload_id,
            ..CreateMultipartUploadResponse::default()
        })
    }

    async fn upload_part(
        &self,
        request: UploadPartRequest<'_>,
    ) -> Result<UploadPartResponse, ApiError> {
        let _guard = self.parts_in_flight.enter();
        self.record(Call::UploadPart {
            upload_id: request.upload_id.clone(),
            part_number: request.part_number,
            len: request.body.len(),
        });

        let (delay, fail) = {
            let faults = self.faults.lock();
            (faults.delay, faults.fail_part == Some(request.part_number))
        };
        tokio::time::sleep(delay).await;
        if fail {
            return Err(internal_error());
        }

        let body = Bytes::copy_from_slice(request.body);
        let mut checksums = Checksums::default();
        if let Some(algorithm) = request.checksum_algorithm {
            checksums.set(algorithm, algorithm.compute(&body));
        }

        let mut uploads = self.uploads.lock();
        let upload = uploads.get_mut(&request.upload_id).ok_or_else(|| {
            ApiError::service(
                StatusCode::NOT_FOUND,
                "NoSuchUpload",
                "The specified upload does not exist.",
            )
        })?;
        upload.parts.insert(request.part_number, body);

        Ok(UploadPartResponse {
            etag: format!("\"part-{}\"", request.part_number),
            checksums,
        })
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadResponse, ApiError> {
        self.record(Call::CompleteMultipartUpload {
            upload_id: request.upload_id.clone(),
            parts: request.parts.iter().map(|part| part.part_number).collect(),
        });

        if self.faults.lock().fail_complete {
            return Err(internal_error());
        }

        let upload = self
            .uploads
            .lock()
            .remove(&request.upload_id)
            .ok_or_else(|| {
                ApiError::service(
                    StatusCode::NOT_FOUND,
                    "NoSuchUpload",
                    "The specified upload does not exist.",
                )
            })?;

        let mut data = Vec::new();
        let mut parts = Vec::new();
        for part in &request.parts {
            let body = upload.parts.get(&part.part_number).ok_or_else(|| {
                ApiError::service(
                    StatusCode::BAD_REQUEST,
                    "InvalidPart",
                    "One or more of the specified parts could not be found.",
                )
            })?;
            parts.push((data.len(), data.len() + body.len()));
            data.extend_from_slice(body);
        }

        let etag = format!("\"etag-{}-{}\"", self.next(), parts.len());
        self.objects.lock().insert(
            upload.key.clone(),
            Object {
                data: Bytes::from(data),
                parts,
                etag: etag.clone(),
                version_id: None,
            },
        );

        Ok(CompleteMultipartUploadResponse {
            location: Some(format!("http://mock/{}/{}", request.bucket, upload.key)),
            etag: Some(etag),
            ..CompleteMultipartUploadResponse::default()
        })
    }

    async fn abort_multipart_upload(
        &self,
        request: AbortMultipartUploadRequest,
    ) -> Result<(), ApiError> {
        self.record(Call::AbortMultipartUpload {
            upload_id: request.upload_id.clone(),
        });
        if self.faults.lock().fail_abort {
            return Err(internal_error());
        }
        self.uploads.lock().remove(&request.upload_id);
        Ok(())
    }

    async fn head_object(&self, request: HeadObjectRequest) -> Result<ObjectMetadata, ApiError> {
        self.record(Call::HeadObject {
            part_number: request.part_number,
        });
        let object = self.find(&request.key)?;
        let (_, mut metadata) = Self::select(&object, request.part_number, None)?;
        if self.faults.lock().stale_head_etag {
            metadata.etag = Some("\"stale\"".to_string());
        }
        Ok(metadata)
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectResponse, ApiError> {
        let guard = self.gets_in_flight.enter();
        self.record(Call::GetObject {
            part_number: request.part_number,
            range: request.range.clone(),
            if_match: request.conditions.if_match.clone(),
        });

        let delay = self.faults.lock().delay;
        tokio::time::sleep(delay).await;

        let object = self.find(&request.key)?;
        if request
            .conditions
            .if_match
            .as_ref()
            .is_some_and(|etag| *etag != object.etag)
        {
            return Err(ApiError::service(
                StatusCode::PRECONDITION_FAILED,
                "PreconditionFailed",
                "At least one of the pre-conditions you specified did not hold",
            ));
        }

        let ((start, end), metadata) =
            Self::select(&object, request.part_number, request.range.as_deref())?;
        let data = object.data.slice(start..end);
        drop(guard);

        let broken = {
            let mut faults = self.faults.lock();
            let broken = faults.broken_bodies > 0;
            faults.broken_bodies = faults.broken_bodies.saturating_sub(1);
            broken
        };

        let body = if broken {
            let half = data.slice(..data.len() / 2);
            stream::iter(vec![
                Ok(half),
                Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
            ])
            .boxed()
        } else {
            // several chunks, like a network body
            let chunks: Vec<io::Result<Bytes>> = (0..data.len())
                .step_by(MIB)
                .map(|i| Ok(data.slice(i..(i + MIB).min(data.len()))))
                .collect();
            stream::iter(chunks).boxed()
        };

        Ok(GetObjectResponse { metadata, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(Option<u64>),
    Bytes(u64),
    Complete(u64),
    Failed(u64),
}

/// Keeps every progress event
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events are `Start`, one or more non decreasing `Bytes`, one terminal
    pub fn assert_lifecycle(&self) {
        let events = self.events();
        assert!(matches!(events.first(), Some(Event::Start(_))), "{events:?}");
        assert!(
            matches!(events.last(), Some(Event::Complete(_) | Event::Failed(_))),
            "{events:?}"
        );

        let starts = events.iter().filter(|e| matches!(e, Event::Start(_))).count();
        let terminals = events
            .iter()
            .filter(|e| matches!(e, Event::Complete(_) | Event::Failed(_)))
            .count();
        assert_eq!(starts, 1, "{events:?}");
        assert_eq!(terminals, 1, "{events:?}");

        let bytes: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Event::Bytes(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert!(!bytes.is_empty(), "{events:?}");
        assert!(bytes.windows(2).all(|w| w[0] <= w[1]), "{events:?}");
    }
}

impl ProgressListener for Recorder {
    fn on_start(&self, _request: &TransferRequest, total_bytes: Option<u64>) {
        self.events.lock().push(Event::Start(total_bytes));
    }

    fn on_bytes_transferred(
        &self,
        _request: &TransferRequest,
        transferred: u64,
        _total_bytes: Option<u64>,
    ) {
        self.events.lock().push(Event::Bytes(transferred));
    }

    fn on_complete(
        &self,
        _request: &TransferRequest,
        _result: TransferResult<'_>,
        transferred: u64,
        _total_bytes: Option<u64>,
    ) {
        self.events.lock().push(Event::Complete(transferred));
    }

    fn on_failed(
        &self,
        _request: &TransferRequest,
        _error: &TransferError,
        transferred: u64,
        _total_bytes: Option<u64>,
    ) {
        self.events.lock().push(Event::Failed(transferred));
    }
}
