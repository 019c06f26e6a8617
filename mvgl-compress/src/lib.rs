//! Per-dialect payload compressors behind one contract.
//!
//! Archive dialects assign one of two compressors; callers never
//! distinguish them past that assignment. The contract:
//!
//! - [`Method::decompress`] hands back the input unchanged when the bytes
//!   are not recognizably compressed or the decoded size disagrees with
//!   the caller's expectation; a primitive refusing recognized input is
//!   an error.
//! - [`Method::compress`] always attempts.
//! - [`Method::is_compressed`] is a non-throwing recognition test.

pub mod error;
mod lz4;
mod zlib;

pub use error::{CompressError, Result};

/// Compression method assigned by an archive dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Zlib streams, 32-bit archive family.
    Zlib,
    /// Raw LZ4 blocks, 64-bit archive family.
    Lz4,
}

impl Method {
    /// Compress `input`, returning the compressed buffer.
    pub fn compress(self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Method::Zlib => zlib::compress(input),
            Method::Lz4 => lz4::compress(input),
        }
    }

    /// Decompress `input` into exactly `expected_len` bytes, or return the
    /// input unchanged when it is not recognizably compressed or the size
    /// does not match.
    pub fn decompress(self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        match self {
            Method::Zlib => zlib::decompress(input, expected_len),
            Method::Lz4 => lz4::decompress(input, expected_len),
        }
    }

    /// Whether `input` looks like this method's output.
    pub fn is_compressed(self, input: &[u8]) -> bool {
        match self {
            Method::Zlib => zlib::is_compressed(input),
            Method::Lz4 => lz4::is_compressed(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_methods_satisfy_the_contract() {
        let data = b"the same contract holds for either method, either family"
            .repeat(8);

        for method in [Method::Zlib, Method::Lz4] {
            let packed = method.compress(&data).unwrap();
            assert!(method.is_compressed(&packed), "{method:?}");
            assert_eq!(method.decompress(&packed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn empty_input_is_never_recognized() {
        for method in [Method::Zlib, Method::Lz4] {
            assert!(!method.is_compressed(&[]), "{method:?}");
        }
    }
}
