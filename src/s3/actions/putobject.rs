use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{PutObjectRequest, PutObjectResponse},
    error::ApiError,
    request::Transport,
    tools,
};
use bytes::Bytes;
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct PutObject<'a> {
    bucket: &'a str,
    key: &'a str,
    body: &'a [u8],
    headers: BTreeMap<String, String>,
}

impl<'a> PutObject<'a> {
    #[must_use]
    pub fn new(request: &'a PutObjectRequest<'_>) -> Self {
        let mut headers = request.object.headers();
        headers.extend(request.fields.headers());

        // <https://docs.aws.amazon.com/AmazonS3/latest/userguide/checking-object-integrity.html>
        if let Some(algorithm) = request.checksum_algorithm {
            headers.insert(
                algorithm.as_amz().to_string(),
                algorithm.compute(request.body),
            );
        }

        Self {
            bucket: &request.bucket,
            key: &request.key,
            body: request.body,
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
    ) -> Result<PutObjectResponse, ApiError> {
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
            Ok(PutObjectResponse::from_headers(response.headers()))
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_PutObject.html>
impl Action for PutObject<'_> {
    fn http_method(&self) -> Method {
        Method::PUT
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
    }

    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>> {
        None
    }

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }
}
