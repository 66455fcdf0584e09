use crate::s3::{
    S3,
    actions::{Action, borrow_headers, object_path, response_error},
    api::{GetObjectRequest, GetObjectResponse, ObjectMetadata},
    error::ApiError,
    request::Transport,
    tools,
};
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::Method;
use std::{collections::BTreeMap, io};

#[derive(Debug)]
pub struct GetObject<'a> {
    bucket: &'a str,
    key: &'a str,
    part_number: Option<String>,
    version_id: Option<&'a str>,
    headers: BTreeMap<String, String>,
}

impl<'a> GetObject<'a> {
    #[must_use]
    pub fn new(request: &'a GetObjectRequest) -> Self {
        let mut headers = request.fields.headers();
        headers.extend(request.conditions.headers());

        if let Some(range) = &request.range {
            headers.insert("range".to_string(), range.clone());
        }

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
    pub async fn request(
        &self,
        s3: &S3,
        transport: &Transport,
    ) -> Result<GetObjectResponse, ApiError> {
        let (url, headers) = self.sign(s3, &tools::sha256_hex(""), None, None)?;

        let response = transport
            .request(url, self.http_method(), &headers, None)
            .await?;

        if response.status().is_success() {
            let metadata = ObjectMetadata::from_headers(response.headers());
            let body = response.bytes_stream().map_err(io::Error::other).boxed();
            Ok(GetObjectResponse { metadata, body })
        } else {
            Err(response_error(response).await)
        }
    }
}

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_GetObject.html>
impl Action for GetObject<'_> {
    fn http_method(&self) -> Method {
        Method::GET
    }

    fn headers(&self) -> Option<BTreeMap<&str, &str>> {
        Some(borrow_headers(&self.headers))
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

    fn path(&self) -> Option<Vec<&str>> {
        Some(object_path(self.bucket, self.key))
    }
}
