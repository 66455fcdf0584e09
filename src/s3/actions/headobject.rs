use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{HeadObjectRequest, ObjectMetadata},
    error::ApiError,
    request::Transport,
    tools,
};
use reqwest::Method;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct HeadObject<'a> {
    bucket: &'a str,
    key: &'a str,
    part_number: Option<String>,
    version_id: Option<&'a str>,
    headers: BTreeMap<String, String>,
}

impl<'a> HeadObject<'a> {
    #[must_use]
    pub fn new(request: &'a HeadObjectRequest) -> Self {
        let mut headers = request.fields.headers();
        if request.checksum_mode {
            headers.insert("x-amz-checksum-mode".to_string(), "ENABLED".to_string());
        }

        Self {
            bucket: &request.bucket,
            key: &request.key,
            part_number: request.part_number.map(|n| n.to_string()),
            version_id: request.version_id.as_deref(),
            headers,
        }
    }

    /// # Errors
    ///
    /// Will return `Err` if can not make the request
    pub async fn request(&self, s3: &S3, transport: &Transport) -> Result<ObjectMetadata, ApiError> {
        let (url, headers) = self.sign(s3, &tools::sha256_hex(""), None, None)?;

        let response = transport
            .request(url, self.http_method(), &headers, None)
            .await?;

        if response.status().is_success() {
            Ok(ObjectMetadata::from_headers(response.headers()))
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_HeadObject.html>
impl Action for HeadObject<'_> {
    fn http_method(&self) -> Method {
        Method::HEAD
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
    }

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }

    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>> {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();

        if let Some(pn) = &self.part_number {
            map.insert("partNumber", pn);
        }

        if let Some(vid) = self.version_id {
            map.insert("versionId", vid);
        }

        Some(map)
    }
}
