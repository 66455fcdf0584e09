//! Amazon S3 multipart upload limits
//! Maximum object size 5 TB
//! Maximum number of parts per upload  10,000
//! <https://docs.aws.amazon.com/AmazonS3/latest/dev/qfacts.html>

use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{CreateMultipartUploadRequest, CreateMultipartUploadResponse, Encryption},
    error::ApiError,
    request::Transport,
    responses::InitiateMultipartUploadResult,
    tools,
};
use anyhow::Context;
use quick_xml::de::from_str;
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct CreateMultipartUpload<'a> {
    bucket: &'a str,
    key: &'a str,
    headers: BTreeMap<String, String>,
}

impl<'a> CreateMultipartUpload<'a> {
    #[must_use]
    pub fn new(request: &'a CreateMultipartUploadRequest) -> Self {
        let mut headers = request.object.headers();
        headers.extend(request.fields.headers());

        // <https://docs.aws.amazon.com/AmazonS3/latest/userguide/checking-object-integrity.html>
        if let Some(algorithm) = request.checksum_algorithm {
            headers.insert(
                "x-amz-checksum-algorithm".to_string(),
                algorithm.as_algorithm().to_string(),
            );
        }

        Self {
            bucket: &request.bucket,
            key: &request.key,
            headers,
        }
    }

    /// # Errors
    ///
    /// Will return `Err` if can not make the request
    pub async fn request(
        &self,
        s3: &S3,
        transport: &Transport,
    ) -> Result<CreateMultipartUploadResponse, ApiError> {
        let (url, headers) = self.sign(s3, &tools::sha256_hex(""), None, None)?;

        let response = transport
            .request(url, self.http_method(), &headers, None)
            .await?;

        if response.status().is_success() {
            let encryption = Encryption::from_headers(response.headers());
            let request_charged = response
                .headers()
                .get("x-amz-request-charged")
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);

            let body = response.text().await?;
            let result: InitiateMultipartUploadResult = from_str(&body)
                .with_context(|| format!("unexpected CreateMultipartUpload response: {body}"))?;

            Ok(CreateMultipartUploadResponse {
                upload_id: result.upload_id,
                encryption,
                request_charged,
            })
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CreateMultipartUpload.html>
impl Action for CreateMultipartUpload<'_> {
    fn http_method(&self) -> Method {
        Method::POST
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
    }

    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>> {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();
        map.insert("uploads", "");
        Some(map)
    }

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }
}
