//! Zlib port, used by the 32-bit archive family.

use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{CompressError, Result};

/// Validate the two-byte zlib stream header: deflate method, a window
/// size within spec, and the FCHECK checksum.
pub(crate) fn is_compressed(input: &[u8]) -> bool {
    if input.len() < 2 {
        return false;
    }
    let cmf = input[0];
    let flg = input[1];

    cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

pub(crate) fn compress(input: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(input)
        .and_then(|()| encoder.finish())
        .map_err(|e| CompressError::Compress(e.to_string()))
}

pub(crate) fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    if !is_compressed(input) {
        return Ok(input.to_vec());
    }

    let mut output = Vec::with_capacity(expected_len);
    ZlibDecoder::new(input)
        .read_to_end(&mut output)
        .map_err(|e| CompressError::Decompress(e.to_string()))?;

    if output.len() != expected_len {
        // Recognition failure, not an error: hand the caller its input back.
        return Ok(input.to_vec());
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_check() {
        assert!(is_compressed(&[0x78, 0x9c]));
        assert!(is_compressed(&[0x78, 0x01]));
        assert!(!is_compressed(&[0x78, 0x9d]));
        assert!(!is_compressed(&[0x00, 0x00]));
        assert!(!is_compressed(&[0x78]));
    }

    #[test]
    fn round_trip() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbcccc".to_vec();
        let packed = compress(&data).unwrap();
        assert!(is_compressed(&packed));
        assert_eq!(decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn unrecognized_input_passes_through() {
        let data = b"\x00plain bytes, no zlib header".to_vec();
        assert_eq!(decompress(&data, 1234).unwrap(), data);
    }

    #[test]
    fn size_mismatch_passes_through() {
        let data = b"some compressible data some compressible data".to_vec();
        let packed = compress(&data).unwrap();
        assert_eq!(decompress(&packed, data.len() + 1).unwrap(), packed);
    }
}
