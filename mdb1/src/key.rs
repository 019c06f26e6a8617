//! Fixed-width archive keys.
//!
//! A key is the on-disk name of a file and at the same time the bit string
//! the index trie discriminates on: four extension bytes up front, then the
//! path stem with `/` folded to `\`, NUL-filled to the dialect's key
//! length. Trailing bytes are always zero, so bit probes past the stored
//! name read as unset.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use crate::error::{Mdb1Error, Result};

/// Length of the extension field at the front of every key.
pub const EXT_LEN: usize = 4;

/// Largest key length across dialects.
pub const MAX_KEY_LEN: usize = 0x80;

#[derive(Clone)]
pub struct ArchiveKey {
    bytes: [u8; MAX_KEY_LEN],
    len: usize,
}

impl ArchiveKey {
    /// Build the key for a relative path, e.g. `data/text/intro.mbe`.
    pub fn from_path_str(path: &str, key_len: usize) -> Result<Self> {
        debug_assert!(key_len <= MAX_KEY_LEN);

        let as_path = Path::new(path);
        let ext = as_path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Mdb1Error::InvalidInput(format!("path has no extension: {path}")))?;
        let stem = as_path.with_extension("");
        let stem = stem
            .to_str()
            .ok_or_else(|| Mdb1Error::InvalidInput(format!("path is not valid UTF-8: {path}")))?;

        let mut bytes = [0u8; MAX_KEY_LEN];

        // Three-letter extensions carry a trailing space; anything longer
        // is cut at the field boundary.
        let ext_bytes = ext.as_bytes();
        let ext_take = ext_bytes.len().min(EXT_LEN);
        bytes[..ext_take].copy_from_slice(&ext_bytes[..ext_take]);
        if ext_bytes.len() == 3 {
            bytes[3] = b' ';
        }

        let budget = key_len - EXT_LEN;
        for (dst, &src) in bytes[EXT_LEN..key_len].iter_mut().zip(stem.as_bytes()) {
            *dst = if src == b'/' { b'\\' } else { src };
        }
        if stem.len() > budget {
            tracing::warn!("path stem truncated to {budget} bytes: {path}");
        }

        Ok(Self {
            bytes,
            len: key_len,
        })
    }

    pub fn from_rel_path(path: &Path, key_len: usize) -> Result<Self> {
        let as_str = path
            .to_str()
            .ok_or_else(|| Mdb1Error::InvalidInput(format!("path is not valid UTF-8: {path:?}")))?;
        Self::from_path_str(as_str, key_len)
    }

    /// Wrap a raw on-disk name entry.
    pub fn from_raw(raw: &[u8]) -> Self {
        debug_assert!(raw.len() <= MAX_KEY_LEN);
        let mut bytes = [0u8; MAX_KEY_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Self {
            bytes,
            len: raw.len(),
        }
    }

    /// The empty key used by the root placeholder slot.
    pub fn empty(key_len: usize) -> Self {
        Self {
            bytes: [0u8; MAX_KEY_LEN],
            len: key_len,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn ext_bytes(&self) -> &[u8] {
        &self.bytes[..EXT_LEN]
    }

    fn name_bytes(&self) -> &[u8] {
        &self.bytes[EXT_LEN..self.len]
    }

    /// Test bit `pos` of the key, LSB-first within each byte. Positions
    /// past the key read as unset.
    pub fn bit(&self, pos: u64) -> bool {
        let byte = (pos >> 3) as usize;
        if pos == u64::MAX || byte >= self.len {
            return false;
        }
        (self.bytes[byte] >> (pos & 7)) & 1 != 0
    }

    /// Whether this is the all-zero placeholder key.
    pub fn is_empty(&self) -> bool {
        self.bytes[..self.len].iter().all(|&b| b == 0)
    }

    /// Reconstruct the logical path, `\` folded back to `/`.
    pub fn to_path_string(&self) -> String {
        let name = trim(self.name_bytes());
        let ext = trim(self.ext_bytes());
        if name.is_empty() && ext.is_empty() {
            return String::new();
        }

        let name = String::from_utf8_lossy(name).replace('\\', "/");
        format!("{}.{}", name, String::from_utf8_lossy(ext))
    }
}

/// Cut at the first NUL or space, whichever comes first.
fn trim(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(bytes.len());
    &bytes[..end]
}

impl PartialEq for ArchiveKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ArchiveKey {}

impl PartialOrd for ArchiveKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArchiveKey {
    /// Name bytes first, extension bytes second.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name_bytes()
            .cmp(other.name_bytes())
            .then_with(|| self.ext_bytes().cmp(other.ext_bytes()))
    }
}

impl fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchiveKey({})", self.to_path_string())
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_letter_extension_gets_a_space() {
        let key = ArchiveKey::from_path_str("data/field.bin", 0x40).unwrap();
        assert_eq!(&key.as_bytes()[..4], b"bin ");
        assert_eq!(&key.as_bytes()[4..14], b"data\\field");
        assert_eq!(key.as_bytes()[14], 0);
    }

    #[test]
    fn four_letter_extension_fills_the_field() {
        let key = ArchiveKey::from_path_str("movie.usm2", 0x40).unwrap();
        assert_eq!(&key.as_bytes()[..4], b"usm2");
    }

    #[test]
    fn path_round_trips_through_the_key() {
        for path in ["a/b.bin", "deep/nested/dir/file.mbe", "top.txt"] {
            let key = ArchiveKey::from_path_str(path, 0x80).unwrap();
            assert_eq!(key.to_path_string(), path);
        }
    }

    #[test]
    fn missing_extension_is_rejected() {
        assert!(ArchiveKey::from_path_str("no_extension", 0x40).is_err());
    }

    #[test]
    fn bit_positions_are_lsb_first() {
        let key = ArchiveKey::from_path_str("x.a", 0x40).unwrap();
        // byte 0 = 'a' = 0x61 = 0b0110_0001
        assert!(key.bit(0));
        assert!(!key.bit(1));
        assert!(key.bit(5));
        assert!(key.bit(6));
        assert!(!key.bit(7));
        // far past the key
        assert!(!key.bit(0x40 * 8));
        assert!(!key.bit(u64::MAX));
    }

    #[test]
    fn ordering_is_name_then_extension() {
        let a = ArchiveKey::from_path_str("alpha.zzz", 0x40).unwrap();
        let b = ArchiveKey::from_path_str("beta.aaa", 0x40).unwrap();
        assert!(a < b, "name bytes dominate");

        let c = ArchiveKey::from_path_str("same.aaa", 0x40).unwrap();
        let d = ArchiveKey::from_path_str("same.bbb", 0x40).unwrap();
        assert!(c < d, "extension breaks ties");
    }

    #[test]
    fn sentinel_key_is_empty() {
        assert!(ArchiveKey::empty(0x40).is_empty());
        assert_eq!(ArchiveKey::empty(0x40).to_path_string(), "");
    }
}
