//! SLLZ decompression entry point
//!
//! Parses the container header and dispatches to the version codec.

use std::io::Cursor;
use tracing::debug;

use crate::{v1, v2, Error, Result, SllzHeader, SllzVersion, HEADER_SIZE};

/// Decompress a complete SLLZ container.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let header = SllzHeader::parse(&mut Cursor::new(data))?;

    let total = header.total_size as usize;
    if data.len() < total {
        return Err(Error::TruncatedData {
            expected: total,
            actual: data.len(),
        });
    }

    let body = &data[HEADER_SIZE..total];
    let decompressed_size = header.decompressed_size as usize;

    let output = match header.version {
        SllzVersion::V1 => v1::decode(body, decompressed_size)?,
        SllzVersion::V2 => v2::decode(body, decompressed_size)?,
    };

    debug!(
        "SLLZ v{}: {} bytes -> {} bytes",
        header.version.as_byte(),
        total,
        output.len()
    );
    Ok(output)
}
