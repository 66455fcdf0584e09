use crate::{
    s3::{
        api::{
            Checksums, CompleteMultipartUploadRequest, CompleteMultipartUploadResponse,
            CompletedPart, CreateMultipartUploadRequest, Encryption, ObjectFields,
            PutObjectRequest, PutObjectResponse, RequestFields, UploadPartRequest,
        },
        checksum::ChecksumAlgorithm,
    },
    stream::body::UploadBody,
};
use tokio_util::sync::CancellationToken;

/// An object to upload
#[derive(Debug, Default)]
pub struct PutObjectInput {
    pub bucket: String,
    pub key: String,
    pub body: UploadBody,
    /// Length hint for bodies that can't report their own
    pub content_length: Option<u64>,
    /// Overrides the algorithm of the client options
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub object: ObjectFields,
    pub fields: RequestFields,
    pub cancellation: CancellationToken,
}

impl PutObjectInput {
    #[must_use]
    pub fn new(bucket: &str, key: &str, body: UploadBody) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
            ..Self::default()
        }
    }

    /// Length of the body when known
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.body.content_length().or(self.content_length)
    }

    pub(crate) fn put_object_request<'a>(
        &self,
        body: &'a [u8],
        algorithm: ChecksumAlgorithm,
    ) -> PutObjectRequest<'a> {
        PutObjectRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            body,
            checksum_algorithm: Some(algorithm),
            object: self.object.clone(),
            fields: self.fields.clone(),
        }
    }

    pub(crate) fn create_multipart_upload_request(
        &self,
        algorithm: ChecksumAlgorithm,
    ) -> CreateMultipartUploadRequest {
        CreateMultipartUploadRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            checksum_algorithm: Some(algorithm),
            object: self.object.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// What every part of one multipart upload shares
#[derive(Debug, Clone)]
pub(crate) struct MultipartTarget {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub fields: RequestFields,
}

impl MultipartTarget {
    pub(crate) fn upload_part_request<'a>(
        &self,
        part_number: u32,
        body: &'a [u8],
    ) -> UploadPartRequest<'a> {
        UploadPartRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
            part_number,
            body,
            checksum_algorithm: Some(self.checksum_algorithm),
            fields: self.fields.clone(),
        }
    }

    pub(crate) fn complete_request(&self, parts: Vec<CompletedPart>) -> CompleteMultipartUploadRequest {
        CompleteMultipartUploadRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
            parts,
            fields: self.fields.clone(),
        }
    }
}

/// The result of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub bucket: String,
    pub key: String,
    /// Set when the object was uploaded in parts
    pub upload_id: Option<String>,
    pub completed_parts: Vec<CompletedPart>,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub checksums: Checksums,
    pub encryption: Encryption,
    pub expiration: Option<String>,
    pub request_charged: Option<String>,
}

impl PutObjectOutput {
    pub(crate) fn from_put(input: &PutObjectInput, response: PutObjectResponse) -> Self {
        Self {
            bucket: input.bucket.clone(),
            key: input.key.clone(),
            upload_id: None,
            completed_parts: Vec::new(),
            location: None,
            etag: response.etag,
            version_id: response.version_id,
            checksums: response.checksums,
            encryption: response.encryption,
            expiration: response.expiration,
            request_charged: response.request_charged,
        }
    }

    pub(crate) fn from_complete(
        target: &MultipartTarget,
        parts: Vec<CompletedPart>,
        response: CompleteMultipartUploadResponse,
        created: Encryption,
    ) -> Self {
        // the complete response may omit encryption details reported at creation
        let encryption = if response.encryption == Encryption::default() {
            created
        } else {
            response.encryption
        };

        Self {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            upload_id: Some(target.upload_id.clone()),
            completed_parts: parts,
            location: response.location,
            etag: response.etag,
            version_id: response.version_id,
            checksums: response.checksums,
            encryption,
            expiration: response.expiration,
            request_charged: response.request_charged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::checksum::Checksum;

    fn target() -> MultipartTarget {
        MultipartTarget {
            bucket: "bucket".to_string(),
            key: "key".to_string(),
            upload_id: "uid".to_string(),
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            fields: RequestFields::default(),
        }
    }

    #[test]
    fn test_requests() {
        let input = PutObjectInput {
            object: ObjectFields {
                content_type: Some("text/plain".to_string()),
                ..ObjectFields::default()
            },
            ..PutObjectInput::new("bucket", "key", UploadBody::from(&b"hello"[..]))
        };
        assert_eq!(input.content_length(), Some(5));

        let put = input.put_object_request(b"hello", ChecksumAlgorithm::Crc32c);
        assert_eq!(put.bucket, "bucket");
        assert_eq!(put.body, b"hello");
        assert_eq!(put.checksum_algorithm, Some(ChecksumAlgorithm::Crc32c));
        assert_eq!(put.object.content_type.as_deref(), Some("text/plain"));

        let create = input.create_multipart_upload_request(ChecksumAlgorithm::Crc32);
        assert_eq!(create.checksum_algorithm, Some(ChecksumAlgorithm::Crc32));

        let part = target().upload_part_request(3, b"abc");
        assert_eq!(part.part_number, 3);
        assert_eq!(part.upload_id, "uid");
        assert_eq!(part.checksum_algorithm, Some(ChecksumAlgorithm::Sha256));
    }

    #[test]
    fn test_from_complete() {
        let parts = vec![CompletedPart {
            part_number: 1,
            etag: "\"a\"".to_string(),
            checksum: Some(Checksum::new(ChecksumAlgorithm::Sha256, "x".to_string())),
        }];
        let created = Encryption {
            server_side_encryption: Some("AES256".to_string()),
            ..Encryption::default()
        };
        let response = CompleteMultipartUploadResponse {
            etag: Some("\"etag-1\"".to_string()),
            ..CompleteMultipartUploadResponse::default()
        };

        let output = PutObjectOutput::from_complete(&target(), parts.clone(), response, created);
        assert_eq!(output.upload_id.as_deref(), Some("uid"));
        assert_eq!(output.completed_parts, parts);
        assert_eq!(output.etag.as_deref(), Some("\"etag-1\""));
        assert_eq!(
            output.encryption.server_side_encryption.as_deref(),
            Some("AES256")
        );
    }
}
