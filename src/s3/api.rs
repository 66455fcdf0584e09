//! The S3 calls the transfer engine is built on
//! <https://docs.aws.amazon.com/AmazonS3/latest/API/API_Operations.html>

use crate::s3::{
    checksum::{Checksum, ChecksumAlgorithm},
    error::ApiError,
    tools,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use std::{collections::BTreeMap, io};

/// Response body of `GetObject`
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn put_object(&self, request: PutObjectRequest<'_>)
    -> Result<PutObjectResponse, ApiError>;

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, ApiError>;

    async fn upload_part(
        &self,
        request: UploadPartRequest<'_>,
    ) -> Result<UploadPartResponse, ApiError>;

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadResponse, ApiError>;

    async fn abort_multipart_upload(
        &self,
        request: AbortMultipartUploadRequest,
    ) -> Result<(), ApiError>;

    async fn head_object(&self, request: HeadObjectRequest) -> Result<ObjectMetadata, ApiError>;

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectResponse, ApiError>;
}

/// Object fields stored with the object, sent by `PutObject` and
/// `CreateMultipartUpload`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFields {
    pub acl: Option<String>,
    pub bucket_key_enabled: Option<bool>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub grant_full_control: Option<String>,
    pub grant_read: Option<String>,
    pub grant_read_acp: Option<String>,
    pub grant_write_acp: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub object_lock_legal_hold_status: Option<String>,
    pub object_lock_mode: Option<String>,
    pub object_lock_retain_until_date: Option<DateTime<Utc>>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_encryption_context: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub tagging: Option<String>,
    pub website_redirect_location: Option<String>,
}

impl ObjectFields {
    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut insert = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };

        insert("x-amz-acl", self.acl.clone());
        insert(
            "x-amz-server-side-encryption-bucket-key-enabled",
            self.bucket_key_enabled.map(|v| v.to_string()),
        );
        insert("cache-control", self.cache_control.clone());
        insert("content-disposition", self.content_disposition.clone());
        insert("content-encoding", self.content_encoding.clone());
        insert("content-language", self.content_language.clone());
        insert("content-type", self.content_type.clone());
        insert("expires", self.expires.as_ref().map(tools::http_date));
        insert("x-amz-grant-full-control", self.grant_full_control.clone());
        insert("x-amz-grant-read", self.grant_read.clone());
        insert("x-amz-grant-read-acp", self.grant_read_acp.clone());
        insert("x-amz-grant-write-acp", self.grant_write_acp.clone());
        insert(
            "x-amz-object-lock-legal-hold",
            self.object_lock_legal_hold_status.clone(),
        );
        insert("x-amz-object-lock-mode", self.object_lock_mode.clone());
        insert(
            "x-amz-object-lock-retain-until-date",
            self.object_lock_retain_until_date
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        insert(
            "x-amz-server-side-encryption",
            self.server_side_encryption.clone(),
        );
        insert(
            "x-amz-server-side-encryption-context",
            self.sse_kms_encryption_context.clone(),
        );
        insert(
            "x-amz-server-side-encryption-aws-kms-key-id",
            self.sse_kms_key_id.clone(),
        );
        insert("x-amz-storage-class", self.storage_class.clone());
        insert("x-amz-tagging", self.tagging.clone());
        insert(
            "x-amz-website-redirect-location",
            self.website_redirect_location.clone(),
        );

        for (k, v) in &self.metadata {
            map.insert(format!("x-amz-meta-{}", k.to_ascii_lowercase()), v.clone());
        }

        map
    }
}

/// Fields every call of one transfer carries
#[derive(Debug, Clone, Default)]
pub struct RequestFields {
    pub expected_bucket_owner: Option<String>,
    pub request_payer: Option<String>,
    pub sse_customer_algorithm: Option<String>,
    pub sse_customer_key: Option<SecretString>,
    pub sse_customer_key_md5: Option<String>,
}

impl RequestFields {
    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(owner) = &self.expected_bucket_owner {
            map.insert("x-amz-expected-bucket-owner".to_string(), owner.clone());
        }
        if let Some(payer) = &self.request_payer {
            map.insert("x-amz-request-payer".to_string(), payer.clone());
        }
        if let Some(algorithm) = &self.sse_customer_algorithm {
            map.insert(
                "x-amz-server-side-encryption-customer-algorithm".to_string(),
                algorithm.clone(),
            );
        }
        if let Some(key) = &self.sse_customer_key {
            map.insert(
                "x-amz-server-side-encryption-customer-key".to_string(),
                key.expose_secret().to_string(),
            );
        }
        if let Some(md5) = &self.sse_customer_key_md5 {
            map.insert(
                "x-amz-server-side-encryption-customer-key-md5".to_string(),
                md5.clone(),
            );
        }
        map
    }
}

/// Conditional request headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    pub if_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_none_match: Option<String>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl Conditions {
    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(etag) = &self.if_match {
            map.insert("if-match".to_string(), etag.clone());
        }
        if let Some(date) = &self.if_modified_since {
            map.insert("if-modified-since".to_string(), tools::http_date(date));
        }
        if let Some(etag) = &self.if_none_match {
            map.insert("if-none-match".to_string(), etag.clone());
        }
        if let Some(date) = &self.if_unmodified_since {
            map.insert("if-unmodified-since".to_string(), tools::http_date(date));
        }
        map
    }
}

/// Additional checksums returned with an object or a part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    pub crc32: Option<String>,
    pub crc32c: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    // FULL_OBJECT or COMPOSITE
    pub checksum_type: Option<String>,
}

impl Checksums {
    #[must_use]
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        match algorithm {
            ChecksumAlgorithm::Crc32 => self.crc32.as_deref(),
            ChecksumAlgorithm::Crc32c => self.crc32c.as_deref(),
            ChecksumAlgorithm::Sha1 => self.sha1.as_deref(),
            ChecksumAlgorithm::Sha256 => self.sha256.as_deref(),
        }
    }

    pub fn set(&mut self, algorithm: ChecksumAlgorithm, value: String) {
        let slot = match algorithm {
            ChecksumAlgorithm::Crc32 => &mut self.crc32,
            ChecksumAlgorithm::Crc32c => &mut self.crc32c,
            ChecksumAlgorithm::Sha1 => &mut self.sha1,
            ChecksumAlgorithm::Sha256 => &mut self.sha256,
        };
        *slot = Some(value);
    }

    /// First checksum present, in `ChecksumAlgorithm::ALL` order
    #[must_use]
    pub fn first(&self) -> Option<Checksum> {
        ChecksumAlgorithm::ALL.into_iter().find_map(|algorithm| {
            self.get(algorithm)
                .map(|value| Checksum::new(algorithm, value.to_string()))
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    /// The first checksum when it covers the whole body. S3 reports the kind
    /// in `x-amz-checksum-type`, without it a `-<parts>` suffix marks a
    /// composite value.
    #[must_use]
    pub fn full_object(&self) -> Option<Checksum> {
        let checksum = self.first()?;
        let full = match self.checksum_type.as_deref() {
            Some(kind) => kind.eq_ignore_ascii_case("FULL_OBJECT"),
            None => checksum.is_full_object(),
        };
        full.then_some(checksum)
    }

    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut checksums = Self {
            checksum_type: header(headers, "x-amz-checksum-type"),
            ..Self::default()
        };
        for algorithm in ChecksumAlgorithm::ALL {
            if let Some(value) = header(headers, algorithm.as_amz()) {
                checksums.set(algorithm, value);
            }
        }
        checksums
    }
}

/// A part committed by `UploadPart`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
    pub checksum: Option<Checksum>,
}

/// Server side encryption details echoed by write calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encryption {
    pub bucket_key_enabled: Option<bool>,
    pub server_side_encryption: Option<String>,
    pub sse_customer_algorithm: Option<String>,
    pub sse_customer_key_md5: Option<String>,
    pub sse_kms_encryption_context: Option<String>,
    pub sse_kms_key_id: Option<String>,
}

impl Encryption {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            bucket_key_enabled: header(headers, "x-amz-server-side-encryption-bucket-key-enabled")
                .map(|v| v.eq_ignore_ascii_case("true")),
            server_side_encryption: header(headers, "x-amz-server-side-encryption"),
            sse_customer_algorithm: header(
                headers,
                "x-amz-server-side-encryption-customer-algorithm",
            ),
            sse_customer_key_md5: header(headers, "x-amz-server-side-encryption-customer-key-md5"),
            sse_kms_encryption_context: header(headers, "x-amz-server-side-encryption-context"),
            sse_kms_key_id: header(headers, "x-amz-server-side-encryption-aws-kms-key-id"),
        }
    }
}

#[derive(Debug)]
pub struct PutObjectRequest<'a> {
    pub bucket: String,
    pub key: String,
    pub body: &'a [u8],
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub object: ObjectFields,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectResponse {
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub checksums: Checksums,
    pub encryption: Encryption,
    pub expiration: Option<String>,
    pub request_charged: Option<String>,
}

impl PutObjectResponse {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header(headers, "etag"),
            version_id: header(headers, "x-amz-version-id"),
            checksums: Checksums::from_headers(headers),
            encryption: Encryption::from_headers(headers),
            expiration: header(headers, "x-amz-expiration"),
            request_charged: header(headers, "x-amz-request-charged"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub object: ObjectFields,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMultipartUploadResponse {
    pub upload_id: String,
    pub encryption: Encryption,
    pub request_charged: Option<String>,
}

#[derive(Debug)]
pub struct UploadPartRequest<'a> {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: u32,
    pub body: &'a [u8],
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPartResponse {
    pub etag: String,
    pub checksums: Checksums,
}

#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadResponse {
    pub location: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub checksums: Checksums,
    pub encryption: Encryption,
    pub expiration: Option<String>,
    pub request_charged: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AbortMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default)]
pub struct HeadObjectRequest {
    pub bucket: String,
    pub key: String,
    pub part_number: Option<u32>,
    pub version_id: Option<String>,
    pub checksum_mode: bool,
    pub fields: RequestFields,
}

#[derive(Debug, Clone, Default)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    pub part_number: Option<u32>,
    pub range: Option<String>,
    pub version_id: Option<String>,
    pub conditions: Conditions,
    pub checksum_mode: bool,
    pub fields: RequestFields,
}

/// Metadata returned by `HeadObject` and `GetObject`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub accept_ranges: Option<String>,
    pub cache_control: Option<String>,
    pub checksums: Checksums,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_length: u64,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
    pub delete_marker: bool,
    pub encryption: Encryption,
    pub etag: Option<String>,
    pub expiration: Option<String>,
    pub expires: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    pub missing_meta: Option<u32>,
    pub object_lock_legal_hold_status: Option<String>,
    pub object_lock_mode: Option<String>,
    pub object_lock_retain_until_date: Option<String>,
    pub parts_count: Option<u32>,
    pub replication_status: Option<String>,
    pub request_charged: Option<String>,
    pub restore: Option<String>,
    pub storage_class: Option<String>,
    pub tag_count: Option<u32>,
    pub version_id: Option<String>,
    pub website_redirect_location: Option<String>,
}

impl ObjectMetadata {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix("x-amz-meta-")?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        Self {
            accept_ranges: header(headers, "accept-ranges"),
            cache_control: header(headers, "cache-control"),
            checksums: Checksums::from_headers(headers),
            content_disposition: header(headers, "content-disposition"),
            content_encoding: header(headers, "content-encoding"),
            content_language: header(headers, "content-language"),
            content_length: parsed(headers, "content-length").unwrap_or_default(),
            content_range: header(headers, "content-range"),
            content_type: header(headers, "content-type"),
            delete_marker: header(headers, "x-amz-delete-marker").is_some_and(|v| v == "true"),
            encryption: Encryption::from_headers(headers),
            etag: header(headers, "etag"),
            expiration: header(headers, "x-amz-expiration"),
            expires: header(headers, "expires"),
            last_modified: header(headers, "last-modified")
                .and_then(|v| tools::parse_http_date(&v)),
            metadata,
            missing_meta: parsed(headers, "x-amz-missing-meta"),
            object_lock_legal_hold_status: header(headers, "x-amz-object-lock-legal-hold"),
            object_lock_mode: header(headers, "x-amz-object-lock-mode"),
            object_lock_retain_until_date: header(headers, "x-amz-object-lock-retain-until-date"),
            parts_count: parsed(headers, "x-amz-mp-parts-count"),
            replication_status: header(headers, "x-amz-replication-status"),
            request_charged: header(headers, "x-amz-request-charged"),
            restore: header(headers, "x-amz-restore"),
            storage_class: header(headers, "x-amz-storage-class"),
            tag_count: parsed(headers, "x-amz-tagging-count"),
            version_id: header(headers, "x-amz-version-id"),
            website_redirect_location: header(headers, "x-amz-website-redirect-location"),
        }
    }

    /// Size of the whole object, taken from `Content-Range` when the
    /// response only carries a slice of it
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.content_range
            .as_deref()
            .and_then(|range| range.rsplit('/').next())
            .and_then(|total| total.parse().ok())
            .unwrap_or(self.content_length)
    }
}

pub struct GetObjectResponse {
    pub metadata: ObjectMetadata,
    pub body: ByteStream,
}

impl std::fmt::Debug for GetObjectResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectResponse")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn parsed<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    header(headers, name).and_then(|v| v.parse().ok())
}
