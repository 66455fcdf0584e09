//! XML payloads of the multipart calls
//! <https://docs.aws.amazon.com/AmazonS3/latest/API/API_CompleteMultipartUpload.html>

use crate::s3::{api::CompletedPart, checksum::ChecksumAlgorithm};
use serde::{Deserialize, Serialize};

/// Error body returned with non 2xx responses, and sometimes with a 200 for
/// `CompleteMultipartUpload`
#[derive(Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Resource", default)]
    pub resource: Option<String>,
    #[serde(rename = "RequestId", default)]
    pub request_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "Location", default)]
    pub location: Option<String>,
    #[serde(rename = "Bucket", default)]
    pub bucket: Option<String>,
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
    #[serde(rename = "ChecksumCRC32", default)]
    pub checksum_crc32: Option<String>,
    #[serde(rename = "ChecksumCRC32C", default)]
    pub checksum_crc32c: Option<String>,
    #[serde(rename = "ChecksumSHA1", default)]
    pub checksum_sha1: Option<String>,
    #[serde(rename = "ChecksumSHA256", default)]
    pub checksum_sha256: Option<String>,
}

/// Request body of `CompleteMultipartUpload`
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Part {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "ChecksumCRC32", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32: Option<String>,
    #[serde(rename = "ChecksumCRC32C", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32c: Option<String>,
    #[serde(rename = "ChecksumSHA1", skip_serializing_if = "Option::is_none")]
    pub checksum_sha1: Option<String>,
    #[serde(rename = "ChecksumSHA256", skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
}

impl From<&CompletedPart> for Part {
    fn from(completed: &CompletedPart) -> Self {
        let mut part = Self {
            part_number: completed.part_number,
            etag: completed.etag.clone(),
            ..Self::default()
        };

        if let Some(checksum) = &completed.checksum {
            let value = Some(checksum.checksum.clone());
            match checksum.algorithm {
                ChecksumAlgorithm::Crc32 => part.checksum_crc32 = value,
                ChecksumAlgorithm::Crc32c => part.checksum_crc32c = value,
                ChecksumAlgorithm::Sha1 => part.checksum_sha1 = value,
                ChecksumAlgorithm::Sha256 => part.checksum_sha256 = value,
            }
        }

        part
    }
}

impl CompleteMultipartUpload {
    #[must_use]
    pub fn new(parts: &[CompletedPart]) -> Self {
        Self {
            parts: parts.iter().map(Part::from).collect(),
        }
    }
}
