//! Error types for SLLZ encoding and decoding

use thiserror::Error;

/// Result type for SLLZ operations
pub type Result<T> = std::result::Result<T, Error>;

/// SLLZ error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid SLLZ magic bytes
    #[error("Invalid SLLZ magic: expected [83, 76, 76, 90], got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unknown endianness tag in the container header
    #[error("Invalid endianness tag: {0:#04x}")]
    InvalidEndianness(u8),

    /// Unknown version byte in the container header
    #[error("Unsupported SLLZ version: {0}")]
    UnsupportedVersion(u8),

    /// The data-offset field did not hold the fixed header size
    #[error("Invalid data offset: {0:#06x} (expected 0x0010)")]
    InvalidDataOffset(u16),

    /// Truncated data
    #[error("Truncated data: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: usize, actual: usize },

    /// The v1 encoder outgrew its allocated output buffer
    #[error("Compressed stream exceeded the {limit}-byte output buffer")]
    ExpansionOverflow { limit: usize },

    /// Input too small for the requested version
    #[error("Input of {len} bytes is below the version 2 minimum of {min}")]
    InputTooSmall { len: usize, min: usize },

    /// A v2 chunk inflated to a different length than its header declared
    #[error("Chunk size mismatch: expected {expected} bytes, got {actual}")]
    ChunkSizeMismatch { expected: usize, actual: usize },

    /// A match token referenced data before the start of the output
    #[error("Match distance {distance} exceeds {available} decoded bytes")]
    InvalidDistance { distance: usize, available: usize },

    /// Decompression failed
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
}
