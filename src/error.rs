//! Error types for the slide reader core.
//!
//! Errors are layered the way the donor codebase layers them: a low-level
//! [`IoError`] for the byte-range source, wrapped into the single
//! [`CoreError`] enum that every parsing, classification, and assembly stage
//! returns. `TagNotFound` stays unwrapped at the top level (not nested in a
//! `Format` variant) because the tile/strip assembler matches on it directly
//! to decide whether to fall back to strip re-assembly.

use thiserror::Error;

/// Errors from the byte-range source layer.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Local file I/O failure. Carries the formatted message since
    /// `std::io::Error` is not `Clone`.
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds.
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Named slide/object could not be located.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Opaque failure from a remote backend (e.g. the optional S3 reader).
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e.to_string())
    }
}

/// Errors surfaced by TIFF parsing, pyramid classification, the JPEG
/// segment surgeon, and the tile/strip assembler.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Io(#[from] IoError),

    /// TIFF signature or version mismatch.
    #[error("bad TIFF header: {0}")]
    BadHeader(String),

    /// BigTIFF offset byte-size was not 8.
    #[error("unsupported BigTIFF offset size: {0}")]
    UnsupportedOffsetSize(u16),

    /// Unknown TIFF tag type code.
    #[error("unknown TIFF type code: {0}")]
    UnknownType(u16),

    /// Required tag absent from an IFD. Never wrapped in another variant:
    /// the assembler pattern-matches `TagNotFound(TileOffsets)` to trigger
    /// the strip fallback path.
    #[error("tag not found: {0}")]
    TagNotFound(u16),

    /// Level or tile/strip index exceeds the table.
    #[error("index out of range: {index} (limit {limit})")]
    IndexOutOfRange { index: u64, limit: u64 },

    /// Byte-range source returned fewer bytes than requested.
    #[error("short read: expected {expected} got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// JPEG stream is structurally invalid.
    #[error("bad JPEG: {0}")]
    BadJpeg(String),

    /// JPEG marker the segment surgeon does not recognise.
    #[error("unknown JPEG segment marker: 0x{0:02X}")]
    UnknownJpegSegment(u8),

    /// Strip path hit a compression the assembler does not implement.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    /// Strip path hit a photometric interpretation the assembler does not implement.
    #[error("unsupported photometric interpretation: {0}")]
    UnsupportedPhotometric(u16),

    /// Image codec failed to decode.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Image codec failed to encode.
    #[error("encode failure: {0}")]
    EncodeFailure(String),
}
