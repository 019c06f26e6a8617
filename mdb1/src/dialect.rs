//! Archive dialect descriptions.
//!
//! A dialect is the concrete set of integer widths, key length, compressor
//! and obfuscation choices identifying one on-disk flavor. Everything the
//! reader and writer need hangs off this record; no generic plumbing.

use mvgl_compress::Method;

/// Width family of the on-disk integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// u16 tree fields, u32 data fields.
    Bits32,
    /// u32 tree fields, u64 data fields.
    Bits64,
}

/// One archive flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub family: Family,
    /// Total on-disk key length, 4-byte extension field included.
    pub key_len: usize,
    pub compressor: Method,
    /// Whether the whole file is scrambled with the positional XOR pad.
    pub obfuscated: bool,
}

/// PC release: 32-bit tables, zlib payloads, whole-file obfuscation.
pub const DSCS: Dialect = Dialect {
    name: "dscs",
    family: Family::Bits32,
    key_len: 0x40,
    compressor: Method::Zlib,
    obfuscated: true,
};

/// Console release: as [`DSCS`] but stored in the clear.
pub const DSCS_CONSOLE: Dialect = Dialect {
    name: "dscs-console",
    family: Family::Bits32,
    key_len: 0x40,
    compressor: Method::Zlib,
    obfuscated: false,
};

/// 64-bit tables, LZ4 payloads, no obfuscation.
pub const DSTS: Dialect = Dialect {
    name: "dsts",
    family: Family::Bits64,
    key_len: 0x80,
    compressor: Method::Lz4,
    obfuscated: false,
};

/// Shares the 64-bit family layout and compressor with [`DSTS`].
pub const THL: Dialect = Dialect {
    name: "thl",
    family: Family::Bits64,
    key_len: 0x80,
    compressor: Method::Lz4,
    obfuscated: false,
};

impl Dialect {
    pub fn header_len(&self) -> u64 {
        match self.family {
            Family::Bits32 => 0x14,
            Family::Bits64 => 0x20,
        }
    }

    pub fn tree_entry_len(&self) -> u64 {
        match self.family {
            Family::Bits32 => 0x08,
            Family::Bits64 => 0x10,
        }
    }

    pub fn name_entry_len(&self) -> u64 {
        self.key_len as u64
    }

    pub fn data_entry_len(&self) -> u64 {
        match self.family {
            Family::Bits32 => 0x0C,
            Family::Bits64 => 0x18,
        }
    }

    /// The all-ones value marking unused tree slots at this width.
    pub fn sentinel(&self) -> u64 {
        match self.family {
            Family::Bits32 => u64::from(u16::MAX),
            Family::Bits64 => u64::from(u32::MAX),
        }
    }

    /// Bytes available for the name portion of a key.
    pub fn name_budget(&self) -> usize {
        self.key_len - crate::key::EXT_LEN
    }
}
