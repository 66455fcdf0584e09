//! AWS S3 service limits and constants
//!
//! This module centralizes the S3 service limits and the transfer defaults
//! derived from them, so that both the uploader and the downloader agree on
//! the numbers.
//!
//! # References
//! - [S3 Quotas](https://docs.aws.amazon.com/AmazonS3/latest/userguide/qfacts.html)
//! - [Multipart Upload Overview](https://docs.aws.amazon.com/AmazonS3/latest/userguide/mpuoverview.html)

/// Size of one mebibyte, the unit every default below is expressed in
pub const MIB: u64 = 1024 * 1024;

/// Maximum size of a single S3 object (5 TB as of 2024)
///
/// AWS limit: 5 TiB (5,497,558,138,880 bytes)
pub const MAX_OBJECT_SIZE_BYTES: u64 = 5_497_558_138_880; // 5 TB

/// Maximum size of a single multipart upload part (5 GB as of 2024)
///
/// AWS limit: 5 GiB (5,368,709,120 bytes)
pub const MAX_PART_SIZE_BYTES: u64 = 5_368_709_120; // 5 GB

/// Maximum number of parts in a multipart upload (10,000 as of 2024)
///
/// AWS limit: 10,000 parts numbered 1 to 10,000
pub const MAX_PARTS_PER_UPLOAD: u32 = 10_000;

/// Minimum part size accepted by the transfer engine (8 MiB)
///
/// S3 itself accepts 5 MiB parts, the engine works with 8 MiB as the floor
/// for both uploads and ranged downloads.
pub const MIN_PART_SIZE_BYTES: u64 = 8 * MIB;

/// Default object size at which uploads switch to multipart (16 MiB)
pub const DEFAULT_MULTIPART_THRESHOLD_BYTES: u64 = 16 * MIB;

/// Default number of bytes buffered by the download reassembler (50 MiB)
pub const DEFAULT_GET_BUFFER_SIZE_BYTES: u64 = 50 * MIB;

/// Default number of concurrent part requests per operation
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default retry budget for re-reading a download part body
pub const DEFAULT_PART_BODY_MAX_RETRIES: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_sane() {
        const _: () = assert!(MAX_OBJECT_SIZE_BYTES > MAX_PART_SIZE_BYTES);
        const _: () = assert!(MAX_PART_SIZE_BYTES > MIN_PART_SIZE_BYTES);
        const _: () = assert!(DEFAULT_MULTIPART_THRESHOLD_BYTES >= MIN_PART_SIZE_BYTES);

        let max_uploadable = MAX_PART_SIZE_BYTES * u64::from(MAX_PARTS_PER_UPLOAD);
        assert!(
            max_uploadable >= MAX_OBJECT_SIZE_BYTES,
            "Should be able to upload max object size: {MAX_OBJECT_SIZE_BYTES} bytes \
             with {MAX_PARTS_PER_UPLOAD} parts of {MAX_PART_SIZE_BYTES} bytes each \
             (total capacity: {max_uploadable} bytes)"
        );
    }

    #[test]
    fn test_documented_values_match_constants() {
        assert_eq!(MAX_OBJECT_SIZE_BYTES, 5_497_558_138_880, "5 TB");
        assert_eq!(MAX_PART_SIZE_BYTES, 5_368_709_120, "5 GB");
        assert_eq!(MIN_PART_SIZE_BYTES, 8_388_608, "8 MiB");
        assert_eq!(DEFAULT_MULTIPART_THRESHOLD_BYTES, 16_777_216, "16 MiB");
        assert_eq!(DEFAULT_GET_BUFFER_SIZE_BYTES, 52_428_800, "50 MiB");
        assert_eq!(MAX_PARTS_PER_UPLOAD, 10_000, "10,000 parts");
    }
}
