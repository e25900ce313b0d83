//! SLLZ version 2: chunked DEFLATE
//!
//! The body is a sequence of chunks covering up to 65 536 input bytes
//! each. Every chunk starts with a 5-byte header that is big-endian
//! regardless of the container endianness:
//!
//! - 3 bytes: chunk total. With the high bit (`0x800000`) set the chunk
//!   payload is stored verbatim; otherwise the total is the DEFLATE
//!   payload length plus the 5 header bytes.
//! - 2 bytes: decoded chunk size minus one (1..=65536).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use tracing::trace;

use crate::{Error, Result};

/// Maximum number of input bytes covered by one chunk.
pub const MAX_CHUNK_SIZE: usize = 0x10000;

/// Size of the per-chunk header.
pub const CHUNK_HEADER_SIZE: usize = 5;

/// High bit of the 24-bit chunk total: the chunk is stored uncompressed.
pub const STORED_FLAG: u32 = 0x0080_0000;

/// Encode `input` into a raw v2 chunk sequence (no container header).
pub fn encode(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();

    for chunk in input.chunks(MAX_CHUNK_SIZE) {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(chunk)?;
        let compressed = encoder.finish()?;

        if compressed.len() >= chunk.len() {
            // DEFLATE did not shrink this chunk; store it verbatim.
            output.write_u24::<BigEndian>(STORED_FLAG)?;
            output.write_u16::<BigEndian>((chunk.len() - 1) as u16)?;
            output.extend_from_slice(chunk);
            trace!("v2 chunk: {} bytes stored", chunk.len());
        } else {
            output.write_u24::<BigEndian>((compressed.len() + CHUNK_HEADER_SIZE) as u32)?;
            output.write_u16::<BigEndian>((chunk.len() - 1) as u16)?;
            output.extend_from_slice(&compressed);
            trace!("v2 chunk: {} bytes -> {} bytes", chunk.len(), compressed.len());
        }
    }

    Ok(output)
}

/// Decode a raw v2 chunk sequence into exactly `decompressed_size` bytes.
pub fn decode(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(decompressed_size);
    let mut cursor = Cursor::new(input);

    while output.len() < decompressed_size {
        let chunk_total = cursor.read_u24::<BigEndian>().map_err(|_| {
            Error::TruncatedData {
                expected: cursor.position() as usize + 3,
                actual: input.len(),
            }
        })?;
        let chunk_size = cursor.read_u16::<BigEndian>().map_err(|_| {
            Error::TruncatedData {
                expected: cursor.position() as usize + 2,
                actual: input.len(),
            }
        })? as usize
            + 1;

        let payload_start = cursor.position() as usize;
        if chunk_total & STORED_FLAG != 0 {
            let payload_end = payload_start + chunk_size;
            let payload = input.get(payload_start..payload_end).ok_or(Error::TruncatedData {
                expected: payload_end,
                actual: input.len(),
            })?;
            output.extend_from_slice(payload);
            cursor.set_position(payload_end as u64);
        } else {
            let payload_len = (chunk_total as usize)
                .checked_sub(CHUNK_HEADER_SIZE)
                .ok_or(Error::DecompressionFailed(format!(
                    "chunk total {chunk_total:#x} is smaller than its header"
                )))?;
            let payload_end = payload_start + payload_len;
            let payload = input.get(payload_start..payload_end).ok_or(Error::TruncatedData {
                expected: payload_end,
                actual: input.len(),
            })?;

            let mut inflated = Vec::with_capacity(chunk_size);
            DeflateDecoder::new(payload)
                .read_to_end(&mut inflated)
                .map_err(|e| Error::DecompressionFailed(format!("DEFLATE failed: {e}")))?;
            if inflated.len() != chunk_size {
                return Err(Error::ChunkSizeMismatch {
                    expected: chunk_size,
                    actual: inflated.len(),
                });
            }

            output.extend_from_slice(&inflated);
            cursor.set_position(payload_end as u64);
        }
    }

    if output.len() != decompressed_size {
        return Err(Error::ChunkSizeMismatch {
            expected: decompressed_size,
            actual: output.len(),
        });
    }

    Ok(output)
}
