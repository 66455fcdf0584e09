use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{Checksums, UploadPartRequest, UploadPartResponse},
    checksum::ChecksumAlgorithm,
    error::ApiError,
    request::Transport,
    tools,
};
use anyhow::anyhow;
use bytes::Bytes;
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct UploadPart<'a> {
    bucket: &'a str,
    key: &'a str,
    upload_id: &'a str,
    part_number: String,
    body: &'a [u8],
    checksum: Option<(ChecksumAlgorithm, String)>,
    headers: BTreeMap<String, String>,
}

impl<'a> UploadPart<'a> {
    #[must_use]
    pub fn new(request: &'a UploadPartRequest<'_>) -> Self {
        let mut headers = request.fields.headers();

        let checksum = request
            .checksum_algorithm
            .map(|algorithm| (algorithm, algorithm.compute(request.body)));

        if let Some((algorithm, value)) = &checksum {
            headers.insert(algorithm.as_amz().to_string(), value.clone());
        }

        Self {
            bucket: &request.bucket,
            key: &request.key,
            upload_id: &request.upload_id,
            part_number: request.part_number.to_string(),
            body: request.body,
            checksum,
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
    ) -> Result<UploadPartResponse, ApiError> {
        let sha = tools::sha256_hex(self.body);
        let md5 = tools::base64_md5(self.body);

        let (url, headers) = self.sign(s3, &sha, Some(&md5), Some(self.body.len()))?;

        let response = transport
            .request(
                url,
                self.http_method(),
                &headers,
                Some(Bytes::copy_from_slice(self.body)),
            )
            .await?;

        if response.status().is_success() {
            let etag = response
                .headers()
                .get("etag")
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
                .ok_or_else(|| anyhow!("missing ETag for part {}", self.part_number))?;

            let mut checksums = Checksums::from_headers(response.headers());
            // not every S3 compatible store echoes the checksum back
            if let Some((algorithm, value)) = &self.checksum {
                if checksums.get(*algorithm).is_none() {
                    checksums.set(*algorithm, value.clone());
                }
            }

            Ok(UploadPartResponse { etag, checksums })
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_UploadPart.html>
impl Action for UploadPart<'_> {
    fn http_method(&self) -> Method {
        Method::PUT
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
    }

    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>> {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();
        map.insert("partNumber", &self.part_number);
        map.insert("uploadId", self.upload_id);
        Some(map)
    }

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }
}
