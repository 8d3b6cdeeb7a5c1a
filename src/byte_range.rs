//! Byte ranges.
//!
//! A [`ByteRange`] represents a byte range relative to the start or end of a byte sequence.
//! A byte range has an offset and optional length, which if omitted means to read all remaining bytes.
//!
//! Byte ranges address the compressed blocks inside an encoded chunk and the chunks inside a contiguous frame.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ByteRange {
    /// A byte range from the start.
    ///
    /// If the byte length is [`None`], reads to the end of the value.
    FromStart(ByteOffset, Option<ByteLength>),
    /// A byte range from the end.
    ///
    /// If the byte length is [`None`], reads to the start of the value.
    FromEnd(ByteOffset, Option<ByteLength>),
}

impl ByteRange {
    /// Return the start of a byte range. `size` is the size of the entire bytes.
    #[must_use]
    pub fn start(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, _) => *offset,
            Self::FromEnd(offset, length) => {
                length.as_ref().map_or(0, |length| size - *offset - *length)
            }
        }
    }

    /// Return the exclusive end of a byte range. `size` is the size of the entire bytes.
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, length) => {
                length.as_ref().map_or(size, |length| offset + length)
            }
            Self::FromEnd(offset, _) => size - offset,
        }
    }

    /// Return the length of a byte range. `size` is the size of the entire bytes.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, None) | Self::FromEnd(offset, None) => size - offset,
            Self::FromStart(_, Some(length)) | Self::FromEnd(_, Some(length)) => *length,
        }
    }

    /// Returns true if the byte range lies within bytes of length `size`.
    #[must_use]
    pub fn is_within(&self, size: u64) -> bool {
        let (Self::FromStart(offset, length) | Self::FromEnd(offset, length)) = self;
        offset
            .checked_add(length.unwrap_or(0))
            .is_some_and(|end| end <= size)
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub fn to_range(&self, size: u64) -> Range<u64> {
        self.start(size)..self.end(size)
    }

    /// Convert the byte range to a [`Range<usize>`].
    ///
    /// # Panics
    ///
    /// Panics if the byte range exceeds [`usize::MAX`].
    #[must_use]
    pub fn to_range_usize(&self, size: u64) -> Range<usize> {
        self.start(size).try_into().unwrap()..self.end(size).try_into().unwrap()
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::FromStart(offset, length) => write!(
                f,
                "{}..{}",
                if offset == &0 {
                    String::new()
                } else {
                    offset.to_string()
                },
                length.map_or(String::new(), |length| (offset + length).to_string())
            ),
            Self::FromEnd(offset, length) => write!(
                f,
                "{}..{}",
                length.map_or(String::new(), |length| format!("-{}", offset + length)),
                if offset == &0 {
                    String::new()
                } else {
                    format!("-{offset}")
                }
            ),
        }
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_bounds() {
        let byte_range = ByteRange::FromStart(5, Some(10));
        assert_eq!(byte_range.to_range(20), 5..15);
        assert_eq!(byte_range.length(20), 10);
        assert!(byte_range.is_within(15));
        assert!(!byte_range.is_within(14));

        let byte_range = ByteRange::FromEnd(2, Some(3));
        assert_eq!(byte_range.to_range(10), 5..8);
        assert_eq!(ByteRange::FromEnd(2, None).to_range(10), 0..8);
        assert_eq!(ByteRange::FromStart(2, None).to_range(10), 2..10);
        assert!(!ByteRange::FromStart(u64::MAX, Some(1)).is_within(u64::MAX));
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(ByteRange::FromStart(0, None).to_string(), "..");
        assert_eq!(ByteRange::FromStart(4, Some(2)).to_string(), "4..6");
        assert_eq!(ByteRange::FromEnd(0, Some(3)).to_string(), "-3..");
    }
}
