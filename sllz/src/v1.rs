//! SLLZ version 1: LZSS with a bit-flag stream
//!
//! The stream is a sequence of groups: one flag byte followed by up to
//! eight tokens. Flag bits are consumed MSB first; a 0 bit means the next
//! token is a literal byte, a 1 bit means it is a two-byte match token
//! `((offset - 1) << 4) | (length - 3)`, stored as a little-endian byte
//! pair regardless of the container endianness.
//!
//! Matches reference a 4096-byte sliding window and cover 3 to 18 bytes.
//! A match may overlap the bytes it produces, so the decoder copies
//! byte-by-byte.

use tracing::trace;

use crate::{Error, Result};

/// Sliding window size.
pub const WINDOW_SIZE: usize = 4096;

/// Minimum match length.
pub const MATCH_MIN: usize = 3;

/// Maximum match length.
pub const MATCH_MAX: usize = 18;

/// Slack added to the input length to size the encoder's output buffer.
const EXPANSION_SLACK: usize = 2048;

/// Encode `input` into a raw v1 token stream (no container header).
///
/// The output buffer is capped at `input.len() + 2048` bytes; incompressible
/// input that outgrows it fails with [`Error::ExpansionOverflow`].
pub fn encode(input: &[u8]) -> Result<Vec<u8>> {
    let limit = input.len() + EXPANSION_SLACK;
    let mut output = Vec::with_capacity(limit.min(1 << 20));

    let mut flag = 0u8;
    let mut bit_count = 0u8;

    // The flag slot is reserved before its eight tokens are known and
    // filled in once the group completes.
    let mut flag_pos = 0;
    output.push(0);

    let mut in_pos = 0;
    while in_pos < input.len() {
        if bit_count == 8 {
            output[flag_pos] = flag;
            flag = 0;
            bit_count = 0;
            flag_pos = output.len();
            output.push(0);
        }

        match find_match(input, in_pos) {
            Some((offset, length)) => {
                flag |= 0x80 >> bit_count;
                let token = (((offset - 1) as u16) << 4) | ((length - MATCH_MIN) as u16 & 0x0F);
                output.push((token & 0xFF) as u8);
                output.push((token >> 8) as u8);
                in_pos += length;
            }
            None => {
                output.push(input[in_pos]);
                in_pos += 1;
            }
        }
        bit_count += 1;

        if output.len() > limit {
            return Err(Error::ExpansionOverflow { limit });
        }
    }

    // Flush the final flag byte, padded with zero bits.
    output[flag_pos] = flag;

    trace!("v1: {} bytes -> {} bytes", input.len(), output.len());
    Ok(output)
}

/// Find the longest, closest match for `input[pos..]` in the sliding window.
///
/// Returns `(offset, length)` where `offset` is the distance back from
/// `pos`. The occurrence must start inside the window but may run past
/// `pos` into the lookahead, which is what produces overlapping matches.
fn find_match(input: &[u8], pos: usize) -> Option<(usize, usize)> {
    let window = pos.min(WINDOW_SIZE);
    let max_len = (input.len() - pos).min(MATCH_MAX);
    if window == 0 || max_len < MATCH_MIN {
        return None;
    }

    for length in (MATCH_MIN..=max_len).rev() {
        let needle = &input[pos..pos + length];
        let haystack = &input[pos - window..pos + length - 1];
        if let Some(start) = haystack
            .windows(length)
            .rposition(|candidate| candidate == needle)
        {
            return Some((window - start, length));
        }
    }

    None
}

/// Decode a raw v1 token stream into exactly `decompressed_size` bytes.
pub fn decode(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; decompressed_size];
    let mut in_pos = 0;
    let mut out_pos = 0;

    while out_pos < decompressed_size {
        let flag = *input.get(in_pos).ok_or(Error::TruncatedData {
            expected: in_pos + 1,
            actual: input.len(),
        })?;
        in_pos += 1;

        for bit in 0..8 {
            if out_pos == decompressed_size {
                break;
            }

            if flag & (0x80 >> bit) == 0 {
                output[out_pos] = *input.get(in_pos).ok_or(Error::TruncatedData {
                    expected: in_pos + 1,
                    actual: input.len(),
                })?;
                in_pos += 1;
                out_pos += 1;
            } else {
                if in_pos + 2 > input.len() {
                    return Err(Error::TruncatedData {
                        expected: in_pos + 2,
                        actual: input.len(),
                    });
                }
                let token = u16::from_le_bytes([input[in_pos], input[in_pos + 1]]);
                in_pos += 2;

                let distance = 1 + (token >> 4) as usize;
                let count = MATCH_MIN + (token & 0x0F) as usize;
                if distance > out_pos {
                    return Err(Error::InvalidDistance {
                        distance,
                        available: out_pos,
                    });
                }

                // Copy byte-by-byte: the match may cover bytes written by
                // this same copy.
                let count = count.min(decompressed_size - out_pos);
                for _ in 0..count {
                    output[out_pos] = output[out_pos - distance];
                    out_pos += 1;
                }
            }
        }
    }

    Ok(output)
}
