//! [`S3Api`] over HTTP with `SigV4` signed requests

use crate::s3::{
    S3,
    actions::{
        AbortMultipartUpload, CompleteMultipartUpload, CreateMultipartUpload, GetObject,
        HeadObject, PutObject, UploadPart,
    },
    api::{
        AbortMultipartUploadRequest, CompleteMultipartUploadRequest,
        CompleteMultipartUploadResponse, CreateMultipartUploadRequest,
        CreateMultipartUploadResponse, GetObjectRequest, GetObjectResponse, HeadObjectRequest,
        ObjectMetadata, PutObjectRequest, PutObjectResponse, S3Api, UploadPartRequest,
        UploadPartResponse,
    },
    checksum,
    error::ApiError,
    request::Transport,
};
use async_trait::async_trait;
use log::debug;

#[derive(Debug, Clone)]
pub struct HttpClient {
    s3: S3,
    transport: Transport,
}

impl HttpClient {
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client can't be built
    pub fn new(s3: S3) -> anyhow::Result<Self> {
        Ok(Self::with_transport(s3, Transport::new()?))
    }

    #[must_use]
    pub const fn with_transport(s3: S3, transport: Transport) -> Self {
        Self { s3, transport }
    }

    #[must_use]
    pub const fn s3(&self) -> &S3 {
        &self.s3
    }
}

#[async_trait]
impl S3Api for HttpClient {
    async fn put_object(
        &self,
        request: PutObjectRequest<'_>,
    ) -> Result<PutObjectResponse, ApiError> {
        debug!(
            "PutObject {}/{} ({} bytes)",
            request.bucket,
            request.key,
            request.body.len()
        );
        PutObject::new(&request)
            .request(&self.s3, &self.transport)
            .await
    }

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, ApiError> {
        debug!("CreateMultipartUpload {}/{}", request.bucket, request.key);
        CreateMultipartUpload::new(&request)
            .request(&self.s3, &self.transport)
            .await
    }

    async fn upload_part(
        &self,
        request: UploadPartRequest<'_>,
    ) -> Result<UploadPartResponse, ApiError> {
        debug!(
            "UploadPart {}/{} part: {} ({} bytes)",
            request.bucket,
            request.key,
            request.part_number,
            request.body.len()
        );
        UploadPart::new(&request)
            .request(&self.s3, &self.transport)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadResponse, ApiError> {
        debug!(
            "CompleteMultipartUpload {}/{} upload id: {} ({} parts)",
            request.bucket,
            request.key,
            request.upload_id,
            request.parts.len()
        );
        CompleteMultipartUpload::new(&request)?
            .request(&self.s3, &self.transport)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        request: AbortMultipartUploadRequest,
    ) -> Result<(), ApiError> {
        debug!(
            "AbortMultipartUpload {}/{} upload id: {}",
            request.bucket, request.key, request.upload_id
        );
        AbortMultipartUpload::new(&request)
            .request(&self.s3, &self.transport)
            .await
    }

    async fn head_object(&self, request: HeadObjectRequest) -> Result<ObjectMetadata, ApiError> {
        debug!("HeadObject {}/{}", request.bucket, request.key);
        HeadObject::new(&request)
            .request(&self.s3, &self.transport)
            .await
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectResponse, ApiError> {
        debug!(
            "GetObject {}/{} part: {:?} range: {:?}",
            request.bucket, request.key, request.part_number, request.range
        );
        let mut response = GetObject::new(&request)
            .request(&self.s3, &self.transport)
            .await?;

        // composite checksums of multipart objects can't be checked here
        let expected = response
            .metadata
            .checksums
            .full_object()
            .filter(|_| request.checksum_mode);
        if let Some(expected) = expected {
            debug!("validating {} checksum of {}", expected.algorithm, request.key);
            response.body = checksum::validate_stream(response.body, expected);
        }

        Ok(response)
    }
}
