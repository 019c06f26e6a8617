//! LZ4 block port, used by the 64-bit archive family.

use crate::error::{CompressError, Result};

/// How many output bytes the recognition probe reconstructs before it
/// accepts the input as an LZ4 stream.
const PROBE_LIMIT: usize = 256;

pub(crate) fn compress(input: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4_flex::block::compress(input))
}

pub(crate) fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    // An LZ4 block carries no uncompressed-size field; equal sizes mean
    // the payload was stored as-is.
    if input.len() == expected_len {
        return Ok(input.to_vec());
    }

    let output = lz4_flex::block::decompress(input, expected_len)
        .map_err(|e| CompressError::Decompress(e.to_string()))?;

    if output.len() != expected_len {
        return Ok(input.to_vec());
    }

    Ok(output)
}

/// Walk the block token stream without materializing output, mirroring a
/// bounded partial decode. Accepts once `PROBE_LIMIT` output bytes are
/// accounted for or the stream ends on a clean literal run.
pub(crate) fn is_compressed(input: &[u8]) -> bool {
    if input.is_empty() {
        return false;
    }

    let mut pos = 0usize;
    let mut out = 0usize;

    loop {
        let Some(&token) = input.get(pos) else {
            return false;
        };
        pos += 1;

        let mut literals = (token >> 4) as usize;
        if literals == 15 {
            loop {
                let Some(&byte) = input.get(pos) else {
                    return false;
                };
                pos += 1;
                literals += byte as usize;
                if byte != 255 {
                    break;
                }
            }
        }

        let Some(after_literals) = pos.checked_add(literals).filter(|&p| p <= input.len()) else {
            return false;
        };
        pos = after_literals;
        out += literals;

        // The final sequence is a bare literal run.
        if pos == input.len() {
            return true;
        }
        if out >= PROBE_LIMIT {
            return true;
        }

        if pos + 2 > input.len() {
            return false;
        }
        let offset = u16::from_le_bytes([input[pos], input[pos + 1]]) as usize;
        pos += 2;
        if offset == 0 || offset > out {
            return false;
        }

        let mut match_len = (token & 0x0f) as usize;
        if match_len == 15 {
            loop {
                let Some(&byte) = input.get(pos) else {
                    return false;
                };
                pos += 1;
                match_len += byte as usize;
                if byte != 255 {
                    break;
                }
            }
        }
        out += match_len + 4;

        if out >= PROBE_LIMIT {
            return true;
        }
    }
}
