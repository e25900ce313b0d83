//! SLLZ Compression/Decompression Library
//!
//! SLLZ is the per-entry codec used inside PARC archives. Payloads are
//! wrapped in a 16-byte container header followed by a version-specific
//! body:
//!
//! - **Version 1** is a raw LZSS stream with an 8-bit flag byte per group
//!   of eight tokens, a 4096-byte sliding window and 3 to 18 byte matches.
//! - **Version 2** splits the input into chunks of up to 64 KiB and
//!   DEFLATE-compresses each chunk independently, falling back to storing
//!   a chunk verbatim when DEFLATE does not shrink it.

pub mod compress;
pub mod decompress;
pub mod error;
pub mod header;
pub mod v1;
pub mod v2;

pub use compress::compress;
pub use decompress::decompress;
pub use error::{Error, Result};
pub use header::SllzHeader;

/// SLLZ magic bytes. Stored as-is regardless of the container endianness.
pub const SLLZ_MAGIC: [u8; 4] = [b'S', b'L', b'L', b'Z'];

/// Size of the SLLZ container header, and the fixed value of its
/// data-offset field.
pub const HEADER_SIZE: usize = 0x10;

/// Minimum input length for a version 2 encode.
///
/// Below this the chunked framing can never pay for itself, and the
/// encoder rejects the request.
pub const V2_MIN_INPUT: usize = 27;

/// Byte order of the multi-byte fields in an SLLZ container (and of the
/// PARC archive that carries it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    /// Little-endian (tag byte 0)
    #[default]
    Little,
    /// Big-endian (tag byte 1)
    Big,
}

impl Endianness {
    /// Parse an endianness tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Little),
            1 => Some(Self::Big),
            _ => None,
        }
    }

    /// Get the tag byte representation.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Little => 0,
            Self::Big => 1,
        }
    }
}

/// SLLZ stream versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SllzVersion {
    /// Raw LZSS stream (version byte 1)
    V1,
    /// Chunked DEFLATE (version byte 2)
    V2,
}

impl SllzVersion {
    /// Parse a version byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

/// Check whether a payload starts with the SLLZ magic.
pub fn is_sllz(data: &[u8]) -> bool {
    data.len() >= SLLZ_MAGIC.len() && data[..SLLZ_MAGIC.len()] == SLLZ_MAGIC
}
