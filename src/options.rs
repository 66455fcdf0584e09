use crate::{
    error::TransferError,
    progress::ProgressListener,
    s3::{checksum::ChecksumAlgorithm, limits},
};
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// How a download is split into concurrent requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GetObjectMode {
    /// one `GetObject` per part number of the uploaded object
    #[default]
    Part,
    /// synthetic byte ranges of `part_size` bytes
    Range,
}

/// Transfer options, copied into every operation
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub part_size: u64,
    pub multipart_threshold: u64,
    pub max_parts: u32,
    pub concurrency: usize,
    pub get_object_mode: GetObjectMode,
    pub get_buffer_size: u64,
    pub part_body_max_retries: u32,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub disable_checksum_validation: bool,
    /// Listeners are called synchronously, a slow listener throttles the transfer
    #[serde(skip)]
    pub progress_listeners: Vec<Arc<dyn ProgressListener>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            part_size: limits::MIN_PART_SIZE_BYTES,
            multipart_threshold: limits::DEFAULT_MULTIPART_THRESHOLD_BYTES,
            max_parts: limits::MAX_PARTS_PER_UPLOAD,
            concurrency: limits::DEFAULT_CONCURRENCY,
            get_object_mode: GetObjectMode::default(),
            get_buffer_size: limits::DEFAULT_GET_BUFFER_SIZE_BYTES,
            part_body_max_retries: limits::DEFAULT_PART_BODY_MAX_RETRIES,
            checksum_algorithm: ChecksumAlgorithm::default(),
            disable_checksum_validation: false,
            progress_listeners: Vec::new(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("part_size", &ByteSize(self.part_size))
            .field("multipart_threshold", &ByteSize(self.multipart_threshold))
            .field("max_parts", &self.max_parts)
            .field("concurrency", &self.concurrency)
            .field("get_object_mode", &self.get_object_mode)
            .field("get_buffer_size", &ByteSize(self.get_buffer_size))
            .field("part_body_max_retries", &self.part_body_max_retries)
            .field("checksum_algorithm", &self.checksum_algorithm)
            .field(
                "disable_checksum_validation",
                &self.disable_checksum_validation,
            )
            .field("progress_listeners", &self.progress_listeners.len())
            .finish()
    }
}

impl Options {
    /// Register a progress listener
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress_listeners.push(listener);
        self
    }

    /// # Errors
    ///
    /// Will return `Err` if a value is outside the limits S3 accepts
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.part_size < limits::MIN_PART_SIZE_BYTES {
            return Err(TransferError::Configuration(format!(
                "part size must be at least {} bytes",
                limits::MIN_PART_SIZE_BYTES
            )));
        }

        if self.part_size > limits::MAX_PART_SIZE_BYTES {
            return Err(TransferError::Configuration(format!(
                "part size must be at most {} bytes",
                limits::MAX_PART_SIZE_BYTES
            )));
        }

        if self.concurrency == 0 {
            return Err(TransferError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if self.max_parts == 0 || self.max_parts > limits::MAX_PARTS_PER_UPLOAD {
            return Err(TransferError::Configuration(format!(
                "max parts must be between 1 and {}",
                limits::MAX_PARTS_PER_UPLOAD
            )));
        }

        Ok(())
    }
}
