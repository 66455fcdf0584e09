use crate::s3::error::ApiError;
use std::{fmt, io};
use thiserror::Error;

/// The S3 call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Operation {
    PutObject,
    CreateMultipartUpload,
    UploadPart(u32),
    CompleteMultipartUpload,
    AbortMultipartUpload,
    HeadObject,
    GetObject,
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PutObject => f.write_str("PutObject"),
            Self::CreateMultipartUpload => f.write_str("CreateMultipartUpload"),
            Self::UploadPart(part) => write!(f, "UploadPart (part {part})"),
            Self::CompleteMultipartUpload => f.write_str("CompleteMultipartUpload"),
            Self::AbortMultipartUpload => f.write_str("AbortMultipartUpload"),
            Self::HeadObject => f.write_str("HeadObject"),
            Self::GetObject => f.write_str("GetObject"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read upload body: {0}")]
    Read(#[source] io::Error),

    #[error(
        "exceeded total allowed S3 limit MaxUploadParts ({max_parts}). Adjust PartSize to fit in this limit"
    )]
    PartLimitExceeded { max_parts: u32 },

    #[error("{operation} failed: {source}")]
    S3 {
        operation: S3Operation,
        #[source]
        source: ApiError,
    },

    #[error("upload multipart failed, upload id: {upload_id}, cause: {source}")]
    MultipartUpload {
        upload_id: String,
        #[source]
        source: Box<TransferError>,
    },

    #[error(
        "failed to abort multipart upload ({abort}), triggered after multipart upload failed: {source}"
    )]
    AbortFailed {
        abort: ApiError,
        #[source]
        source: Box<TransferError>,
    },

    #[error("object changed during download: {0}")]
    PreconditionFailed(#[source] ApiError),

    #[error("invalid input range, must be between 0 and {max}")]
    InvalidRange { max: u64 },

    #[error("failed to read part body: {0}")]
    PartBody(#[source] io::Error),

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Wrap the failure of one S3 call, a failed `If-Match` becomes
    /// [`TransferError::PreconditionFailed`]
    #[must_use]
    pub fn s3(operation: S3Operation, source: ApiError) -> Self {
        if matches!(operation, S3Operation::GetObject) && source.is_precondition_failed() {
            Self::PreconditionFailed(source)
        } else {
            Self::S3 { operation, source }
        }
    }

    /// Upload id of the multipart upload this error belongs to
    #[must_use]
    pub fn upload_id(&self) -> Option<&str> {
        match self {
            Self::MultipartUpload { upload_id, .. } => Some(upload_id),
            _ => None,
        }
    }

    /// The error at the root of a multipart failure
    #[must_use]
    pub fn cause(&self) -> &Self {
        match self {
            Self::MultipartUpload { source, .. } | Self::AbortFailed { source, .. } => {
                source.cause()
            }
            _ => self,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause(), Self::Cancelled)
    }

    /// Turn the error into an `io::Error`, as returned by the download body
    #[must_use]
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Cancelled => io::Error::new(io::ErrorKind::Interrupted, self),
            Self::PartBody(ref e) if e.kind() == io::ErrorKind::InvalidData => {
                io::Error::new(io::ErrorKind::InvalidData, self)
            }
            _ => io::Error::other(self),
        }
    }
}
