//! Actions
//! <https://docs.aws.amazon.com/AmazonS3/latest/API/API_Operations.html>

use crate::s3::{S3, error::ApiError, responses::ErrorResponse, signature::Signature};
use anyhow::{Result, anyhow};
use quick_xml::de::from_str;
use reqwest::{Method, Response};
use std::collections::BTreeMap;
use url::Url;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_HeadObject.html>
mod headobject;
pub use self::headobject::HeadObject;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_GetObject.html>
mod getobject;
pub use self::getobject::GetObject;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_PutObject.html>
mod putobject;
pub use self::putobject::PutObject;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CreateMultipartUpload.html>
mod createmultipartupload;
pub use self::createmultipartupload::CreateMultipartUpload;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_UploadPart.html>
mod uploadpart;
pub use self::uploadpart::UploadPart;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CompleteMultipartUpload.html>
mod completemultipartupload;
pub use self::completemultipartupload::CompleteMultipartUpload;

// <https://docs.aws.amazon.com/AmazonS3/latest/API/API_AbortMultipartUpload.html>
mod abortmultipartupload;
pub use self::abortmultipartupload::AbortMultipartUpload;

pub trait Action {
    // headers to send in the request
    fn headers(&self) -> Option<BTreeMap<&str, &str>>;

    // method to use GET/PUT...
    fn http_method(&self) -> Method;

    // URL query pairs
    fn query_pairs(&self) -> Option<BTreeMap<&str, &str>>;

    // URL path
    fn path(&self) -> Option<Vec<&str>>;

    /// # Errors
    ///
    /// Will return `Err` if the signature can not be created
    fn sign(
        &self,
        s3: &S3,
        hash_payload: &str,
        md5: Option<&str>,
        content_length: Option<usize>,
    ) -> Result<(Url, BTreeMap<String, String>)> {
        let mut url = s3.endpoint()?;

        if let Some(path) = self.path() {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| anyhow!("cannot be base: {}", s3.region().endpoint()))?;
            segments.pop_if_empty();
            for p in path {
                segments.push(p);
            }
        }

        // GET - query pairs
        if let Some(pairs) = &self.query_pairs() {
            for (k, v) in pairs {
                url.query_pairs_mut().append_pair(k, v);
            }
        }

        let mut signature = Signature::new(s3, "s3", self.http_method())?;
        let headers = signature.sign(&url, hash_payload, md5, content_length, self.headers())?;
        Ok((url, headers))
    }
}

/// Path of an object, path-style addressing
pub(crate) fn object_path<'a>(bucket: &'a str, key: &'a str) -> Vec<&'a str> {
    std::iter::once(bucket).chain(key.split('/')).collect()
}

/// Borrow an owned header map the way `Action::headers` returns it
pub(crate) fn borrow_headers(headers: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
    headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

/// Turn a non 2xx response into an [`ApiError`]
pub async fn response_error(response: Response) -> ApiError {
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-amz-request-id")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return ApiError::Http(e),
    };

    match from_str::<ErrorResponse>(&body) {
        Ok(e) => ApiError::Service {
            status,
            code: e.code,
            message: e.message,
            request_id: e.request_id.or(request_id),
        },
        // HEAD responses and some proxies don't carry an XML body
        Err(_) => ApiError::Service {
            status,
            code: status
                .canonical_reason()
                .unwrap_or(status.as_str())
                .replace(' ', ""),
            message: body,
            request_id,
        },
    }
}
