use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{
        Checksums, CompleteMultipartUploadRequest, CompleteMultipartUploadResponse, Encryption,
    },
    checksum::ChecksumAlgorithm,
    error::ApiError,
    request::Transport,
    responses::{self, CompleteMultipartUploadResult, ErrorResponse},
    tools,
};
use anyhow::Context;
use bytes::Bytes;
use quick_xml::{de::from_str, se::to_string};
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct CompleteMultipartUpload<'a> {
    bucket: &'a str,
    key: &'a str,
    upload_id: &'a str,
    body: String,
    headers: BTreeMap<String, String>,
}

impl<'a> CompleteMultipartUpload<'a> {
    /// # Errors
    ///
    /// Will return `Err` if the parts can't be serialized
    pub fn new(request: &'a CompleteMultipartUploadRequest) -> anyhow::Result<Self> {
        let body = to_string(&responses::CompleteMultipartUpload::new(&request.parts))
            .context("failed to serialize CompleteMultipartUpload")?;

        Ok(Self {
            bucket: &request.bucket,
            key: &request.key,
            upload_id: &request.upload_id,
            body,
            headers: request.fields.headers(),
        })
    }

    /// # Errors
    ///
    /// Will return `Err` if can not make the request
    pub async fn request(
        &self,
        s3: &S3,
        transport: &Transport,
    ) -> Result<CompleteMultipartUploadResponse, ApiError> {
        let sha = tools::sha256_hex(&self.body);
        let (url, headers) = self.sign(s3, &sha, None, Some(self.body.len()))?;

        let response = transport
            .request(
                url,
                self.http_method(),
                &headers,
                Some(Bytes::from(self.body.clone())),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_error(response).await);
        }

        let status = response.status();
        let mut output = CompleteMultipartUploadResponse {
            version_id: header(&response, "x-amz-version-id"),
            expiration: header(&response, "x-amz-expiration"),
            request_charged: header(&response, "x-amz-request-charged"),
            encryption: Encryption::from_headers(response.headers()),
            ..CompleteMultipartUploadResponse::default()
        };

        let body = response.text().await?;

        // a 200 may still carry an error
        // <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CompleteMultipartUpload.html>
        if let Ok(e) = from_str::<ErrorResponse>(&body) {
            return Err(ApiError::Service {
                status,
                code: e.code,
                message: e.message,
                request_id: e.request_id,
            });
        }

        let result: CompleteMultipartUploadResult = from_str(&body)
            .with_context(|| format!("unexpected CompleteMultipartUpload response: {body}"))?;

        let mut checksums = Checksums::default();
        for (algorithm, value) in [
            (ChecksumAlgorithm::Crc32, result.checksum_crc32),
            (ChecksumAlgorithm::Crc32c, result.checksum_crc32c),
            (ChecksumAlgorithm::Sha1, result.checksum_sha1),
            (ChecksumAlgorithm::Sha256, result.checksum_sha256),
        ] {
            if let Some(value) = value {
                checksums.set(algorithm, value);
            }
        }

        output.location = result.location;
        output.etag = result.etag;
        output.checksums = checksums;

        Ok(output)
    }
}

fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CompleteMultipartUpload.html>
impl Action for CompleteMultipartUpload<'_> {
    fn http_method(&self) -> Method {
        Method::POST
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
    }

    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>> {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();
        map.insert("uploadId", self.upload_id);
        Some(map)
    }

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }
}
