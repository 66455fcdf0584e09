//! HTTP byte ranges
//! <https://www.rfc-editor.org/rfc/rfc9110#name-byte-ranges>

use crate::error::TransferError;
use std::fmt;

/// A half open span `[start, end)` of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Parse a `Range` header against an object of `total` bytes
    ///
    /// Accepts `bytes=first-last`, `bytes=first-` and `bytes=-suffix`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the range is malformed or not within the object
    pub fn parse(range: &str, total: u64) -> Result<Self, TransferError> {
        let invalid = || TransferError::InvalidRange {
            max: total.saturating_sub(1),
        };

        let bounds = range.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        let (first, last) = bounds.split_once('-').ok_or_else(invalid)?;
        let (first, last) = (first.trim(), last.trim());

        let parsed = match (first.is_empty(), last.is_empty()) {
            // bytes=-n, the last n bytes
            (true, false) => {
                let suffix: u64 = last.parse().map_err(|_| invalid())?;
                if suffix == 0 {
                    return Err(invalid());
                }
                Self::new(total.saturating_sub(suffix), total)
            }
            // bytes=a-, from a to the end
            (false, true) => {
                let start: u64 = first.parse().map_err(|_| invalid())?;
                Self::new(start, total)
            }
            (false, false) => {
                let start: u64 = first.parse().map_err(|_| invalid())?;
                let last: u64 = last.parse().map_err(|_| invalid())?;
                if last >= total || start > last {
                    return Err(invalid());
                }
                Self::new(start, last + 1)
            }
            (true, true) => return Err(invalid()),
        };

        if parsed.start >= total {
            return Err(invalid());
        }

        Ok(parsed)
    }

    /// `Range` header value, both ends inclusive
    #[must_use]
    pub fn header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }

    /// `Content-Range` header value for an object of `total` bytes
    #[must_use]
    pub fn content_range(&self, total: u64) -> String {
        format!(
            "bytes {}-{}/{total}",
            self.start,
            self.end.saturating_sub(1)
        )
    }

    /// Split into consecutive spans of at most `size` bytes
    #[must_use]
    pub fn chunk(&self, index: u64, size: u64) -> Option<Self> {
        let start = self.start.checked_add(index.checked_mul(size)?)?;
        if start >= self.end {
            return None;
        }
        Some(Self::new(start, start.saturating_add(size).min(self.end)))
    }

    /// Number of chunks of `size` bytes covering the range
    #[must_use]
    pub const fn chunks(&self, size: u64) -> u64 {
        if self.is_empty() || size == 0 {
            return 0;
        }
        (self.len() - 1) / size + 1
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}
