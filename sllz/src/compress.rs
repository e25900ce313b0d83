//! SLLZ compression entry point
//!
//! Encodes a payload with the requested stream version and wraps it in the
//! 16-byte container header.

use tracing::debug;

use crate::{v1, v2, Endianness, Error, Result, SllzHeader, SllzVersion, HEADER_SIZE, V2_MIN_INPUT};

/// Compress `data` into a complete SLLZ container.
///
/// Version 2 requests are rejected for inputs shorter than
/// [`V2_MIN_INPUT`] bytes, where the chunked framing cannot pay for
/// itself.
pub fn compress(data: &[u8], version: SllzVersion, endianness: Endianness) -> Result<Vec<u8>> {
    if version == SllzVersion::V2 && data.len() < V2_MIN_INPUT {
        return Err(Error::InputTooSmall {
            len: data.len(),
            min: V2_MIN_INPUT,
        });
    }

    let body = match version {
        SllzVersion::V1 => v1::encode(data)?,
        SllzVersion::V2 => v2::encode(data)?,
    };

    let header = SllzHeader {
        endianness,
        version,
        decompressed_size: data.len() as u32,
        total_size: (HEADER_SIZE + body.len()) as u32,
    };

    let mut output = Vec::with_capacity(HEADER_SIZE + body.len());
    header.write(&mut output)?;
    output.extend_from_slice(&body);

    debug!(
        "SLLZ v{}: {} bytes -> {} bytes",
        version.as_byte(),
        data.len(),
        output.len()
    );
    Ok(output)
}
