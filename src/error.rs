//! Error taxonomy for decoding YAFFS2 images.
//!
//! Errors fall into two groups: record-level problems that only affect the current page/spare
//! pair (see [Error::is_recoverable]), and structural problems after which nothing further in the
//! image can be trusted.

use std::io;

use thiserror::Error;

/// Which invariant a spare tag violated
#[derive(Debug, Eq, PartialEq, Copy, Clone, Error)]
pub enum InvalidTag {
    #[error("sequence number {0:#x} out of range")]
    SequenceNumber(u32),

    #[error("object id {0:#x} out of range")]
    ObjectId(u32),

    #[error("chunk id {0:#x} exceeds the addressable maximum")]
    ChunkId(u32),
}

#[derive(Debug, Error)]
pub enum Error {
    /// No candidate geometry produced a header-then-successor pair.
    #[error("no suitable geometry detected")]
    GeometryNotDetected,

    /// The buffer is too short to hold the fixed-width record.
    #[error("malformed {record} record: need {needed} bytes, have {available}")]
    MalformedRecord {
        record: &'static str,
        needed: usize,
        available: usize,
    },

    /// The spare tag parsed, but its contents are not a valid YAFFS2 tag.
    #[error("invalid spare tag: {0}")]
    InvalidTag(#[from] InvalidTag),

    /// An object header did not carry the 0xFFFF sentinel, so pages are being read misaligned.
    #[error("object header sentinel is {found:#06x}, expected 0xffff (wrong geometry or corrupt image)")]
    ChecksumMismatch { found: u16 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Can the caller carry on after this error?
    ///
    /// Undetected geometry falls back to a default, and an invalid tag only costs one pair.
    /// Everything else ends the scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::GeometryNotDetected | Self::InvalidTag(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[test]
fn test_recoverable() {
    assert!(Error::GeometryNotDetected.is_recoverable());
    assert!(Error::InvalidTag(InvalidTag::ObjectId(0)).is_recoverable());
    assert!(!Error::ChecksumMismatch { found: 0 }.is_recoverable());
    assert!(!Error::MalformedRecord {
        record: "spare",
        needed: 16,
        available: 3
    }
    .is_recoverable());
}
