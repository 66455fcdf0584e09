//! Additional checksums
//! <https://docs.aws.amazon.com/AmazonS3/latest/userguide/checking-object-integrity.html>

pub mod hasher;

use crate::s3::api::ByteStream;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use hasher::{ChecksumHasher, Crc32Hasher, Crc32cHasher, Sha1Hasher, Sha256Hasher};
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    #[default]
    Crc32,
    Crc32c,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Every algorithm, in the order S3 documents them
    pub const ALL: [Self; 4] = [Self::Crc32, Self::Crc32c, Self::Sha1, Self::Sha256];

    /// Value of the `x-amz-checksum-algorithm` header
    #[must_use]
    pub const fn as_algorithm(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Header carrying the checksum value
    #[must_use]
    pub const fn as_amz(&self) -> &'static str {
        match self {
            Self::Crc32 => "x-amz-checksum-crc32",
            Self::Crc32c => "x-amz-checksum-crc32c",
            Self::Sha1 => "x-amz-checksum-sha1",
            Self::Sha256 => "x-amz-checksum-sha256",
        }
    }

    /// XML element used by `CompleteMultipartUpload`
    #[must_use]
    pub const fn as_xml_element(&self) -> &'static str {
        match self {
            Self::Crc32 => "ChecksumCRC32",
            Self::Crc32c => "ChecksumCRC32C",
            Self::Sha1 => "ChecksumSHA1",
            Self::Sha256 => "ChecksumSHA256",
        }
    }

    #[must_use]
    pub fn hasher(&self) -> Box<dyn ChecksumHasher> {
        match self {
            Self::Crc32 => Box::<Crc32Hasher>::default(),
            Self::Crc32c => Box::<Crc32cHasher>::default(),
            Self::Sha1 => Box::<Sha1Hasher>::default(),
            Self::Sha256 => Box::<Sha256Hasher>::default(),
        }
    }

    /// Base64 checksum of `data`, the header value S3 expects
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        Base64::encode_string(&hasher.finalize())
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_algorithm())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(algorithm: &str) -> Result<Self, Self::Err> {
        match algorithm.to_lowercase().as_str() {
            "crc32" => Ok(Self::Crc32),
            "crc32c" => Ok(Self::Crc32c),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unsupported checksum algorithm: {other}")),
        }
    }
}

/// A checksum value together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub checksum: String,
}

impl Checksum {
    #[must_use]
    pub const fn new(algorithm: ChecksumAlgorithm, checksum: String) -> Self {
        Self {
            algorithm,
            checksum,
        }
    }

    /// Checksums of multipart objects are composite (`<value>-<parts>`) and
    /// can't be checked against the bytes of a single response.
    #[must_use]
    pub fn is_full_object(&self) -> bool {
        !self.checksum.contains('-')
    }
}

/// Wrap `stream` so that the last item fails with `InvalidData` when the
/// bytes don't hash to `expected`.
#[must_use]
pub fn validate_stream(stream: ByteStream, expected: Checksum) -> ByteStream {
    ValidatingStream {
        inner: stream,
        hasher: Some(expected.algorithm.hasher()),
        expected,
    }
    .boxed()
}

struct ValidatingStream {
    inner: ByteStream,
    hasher: Option<Box<dyn ChecksumHasher>>,
    expected: Checksum,
}

impl Stream for ValidatingStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&bytes);
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(None) => {
                let Some(hasher) = this.hasher.take() else {
                    return Poll::Ready(None);
                };

                let actual = Base64::encode_string(&hasher.finalize());
                if actual == this.expected.checksum {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "{} checksum mismatch, expected: {}, computed: {actual}",
                            this.expected.algorithm, this.expected.checksum
                        ),
                    ))))
                }
            }
            other => other,
        }
    }
}
