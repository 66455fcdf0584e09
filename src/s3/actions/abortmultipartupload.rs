use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::AbortMultipartUploadRequest,
    error::ApiError,
    request::Transport,
    tools,
};
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct AbortMultipartUpload<'a> {
    bucket: &'a str,
    key: &'a str,
    upload_id: &'a str,
    headers: BTreeMap<String, String>,
}

impl<'a> AbortMultipartUpload<'a> {
    #[must_use]
    pub fn new(request: &'a AbortMultipartUploadRequest) -> Self {
        Self {
            bucket: &request.bucket,
            key: &request.key,
            upload_id: &request.upload_id,
            headers: request.fields.headers(),
        }
    }

    /// # Errors
    ///
    /// Will return `Err` if can not make the request
    pub async fn request(&self, s3: &S3, transport: &Transport) -> Result<(), ApiError> {
        let (url, headers) = self.sign(s3, &tools::sha256_hex(""), None, None)?;

        let response = transport
            .request(url, self.http_method(), &headers, None)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_AbortMultipartUpload.html>
impl Action for AbortMultipartUpload<'_> {
    fn http_method(&self) -> Method {
        Method::DELETE
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
