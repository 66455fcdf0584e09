use crate::{
    s3::api::{Conditions, GetObjectRequest, HeadObjectRequest, ObjectMetadata, RequestFields},
    stream::body::ObjectBody,
};
use tokio_util::sync::CancellationToken;

/// An object to download
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    pub bucket: String,
    pub key: String,
    /// Download only this part, in one request
    pub part_number: Option<u32>,
    /// `bytes=first-last`, `bytes=first-` or `bytes=-suffix`
    pub range: Option<String>,
    pub version_id: Option<String>,
    pub conditions: Conditions,
    /// Ask for checksums even when validation is disabled in the options
    pub checksum_mode: bool,
    pub fields: RequestFields,
    pub cancellation: CancellationToken,
}

impl GetObjectInput {
    #[must_use]
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// The request of a single shot download
    pub(crate) fn get_object_request(&self, checksum_mode: bool) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            part_number: self.part_number,
            range: self.range.clone(),
            version_id: self.version_id.clone(),
            conditions: self.conditions.clone(),
            checksum_mode,
            fields: self.fields.clone(),
        }
    }

    pub(crate) fn head_object_request(
        &self,
        part_number: Option<u32>,
        checksum_mode: bool,
    ) -> HeadObjectRequest {
        HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            part_number,
            version_id: self.version_id.clone(),
            checksum_mode,
            fields: self.fields.clone(),
        }
    }
}

/// A download in progress, `body` yields the bytes
#[derive(Debug)]
pub struct GetObjectOutput {
    pub metadata: ObjectMetadata,
    pub body: ObjectBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests() {
        let input = GetObjectInput {
            range: Some("bytes=0-9".to_string()),
            version_id: Some("v1".to_string()),
            conditions: Conditions {
                if_none_match: Some("\"x\"".to_string()),
                ..Conditions::default()
            },
            ..GetObjectInput::new("bucket", "key")
        };

        let get = input.get_object_request(true);
        assert_eq!(get.range.as_deref(), Some("bytes=0-9"));
        assert_eq!(get.version_id.as_deref(), Some("v1"));
        assert_eq!(get.conditions.if_none_match.as_deref(), Some("\"x\""));
        assert!(get.checksum_mode);

        let head = input.head_object_request(Some(1), false);
        assert_eq!(head.part_number, Some(1));
        assert_eq!(head.version_id.as_deref(), Some("v1"));
        assert!(!head.checksum_mode);
    }
}
