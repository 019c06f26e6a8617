//! On-disk layout of the archive header and the three parallel tables.
//!
//! All integers are little-endian. The two width families share field
//! order; only the widths differ. Sentinel fields are all-ones at their
//! width and normalize to [`INVALID`] in memory.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::dialect::{Dialect, Family};
use crate::error::{Mdb1Error, Result};
use crate::key::ArchiveKey;
use crate::tree::INVALID;

/// Magic of a plain archive, `MDB1`.
pub const MDB1_MAGIC: u32 = 0x3142_444D;

/// First word of an archive scrambled whole-file with the XOR pad.
pub const MDB1_MAGIC_OBFUSCATED: u32 = 0x608D_920C;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub file_entry_count: u64,
    pub file_name_count: u64,
    pub data_entry_count: u64,
    pub data_start: u64,
    pub total_size: u64,
}

/// Tree table record, widths normalized.
#[derive(Debug, Clone, Copy)]
pub struct RawTreeEntry {
    pub compare_bit: u64,
    pub data_id: u64,
    pub left: u64,
    pub right: u64,
}

/// Data table record: where a payload lives and how big it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEntry {
    pub offset: u64,
    pub full_size: u64,
    pub compressed_size: u64,
}

pub fn read_header<R: Read>(reader: &mut R, dialect: &Dialect) -> Result<Header> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != MDB1_MAGIC {
        return Err(Mdb1Error::BadMagic(magic));
    }

    let header = match dialect.family {
        Family::Bits32 => Header {
            file_entry_count: u64::from(reader.read_u16::<LittleEndian>()?),
            file_name_count: u64::from(reader.read_u16::<LittleEndian>()?),
            data_entry_count: u64::from(reader.read_u32::<LittleEndian>()?),
            data_start: u64::from(reader.read_u32::<LittleEndian>()?),
            total_size: u64::from(reader.read_u32::<LittleEndian>()?),
        },
        Family::Bits64 => Header {
            file_entry_count: u64::from(reader.read_u32::<LittleEndian>()?),
            file_name_count: u64::from(reader.read_u32::<LittleEndian>()?),
            data_entry_count: u64::from(reader.read_u32::<LittleEndian>()?),
            data_start: reader.read_u64::<LittleEndian>()?,
            total_size: reader.read_u64::<LittleEndian>()?,
        },
    };
    Ok(header)
}

pub fn write_header<W: Write>(writer: &mut W, dialect: &Dialect, header: &Header) -> Result<()> {
    writer.write_u32::<LittleEndian>(MDB1_MAGIC)?;
    match dialect.family {
        Family::Bits32 => {
            writer.write_u16::<LittleEndian>(narrow16(header.file_entry_count)?)?;
            writer.write_u16::<LittleEndian>(narrow16(header.file_name_count)?)?;
            writer.write_u32::<LittleEndian>(narrow32(header.data_entry_count)?)?;
            writer.write_u32::<LittleEndian>(narrow32(header.data_start)?)?;
            writer.write_u32::<LittleEndian>(narrow32(header.total_size)?)?;
        }
        Family::Bits64 => {
            writer.write_u32::<LittleEndian>(narrow32(header.file_entry_count)?)?;
            writer.write_u32::<LittleEndian>(narrow32(header.file_name_count)?)?;
            writer.write_u32::<LittleEndian>(narrow32(header.data_entry_count)?)?;
            writer.write_u64::<LittleEndian>(header.data_start)?;
            writer.write_u64::<LittleEndian>(header.total_size)?;
        }
    }
    Ok(())
}

pub fn read_tree_entry<R: Read>(reader: &mut R, dialect: &Dialect) -> Result<RawTreeEntry> {
    let entry = match dialect.family {
        Family::Bits32 => RawTreeEntry {
            compare_bit: widen(u64::from(reader.read_u16::<LittleEndian>()?), dialect),
            data_id: widen(u64::from(reader.read_u16::<LittleEndian>()?), dialect),
            left: u64::from(reader.read_u16::<LittleEndian>()?),
            right: u64::from(reader.read_u16::<LittleEndian>()?),
        },
        Family::Bits64 => RawTreeEntry {
            compare_bit: widen(u64::from(reader.read_u32::<LittleEndian>()?), dialect),
            data_id: widen(u64::from(reader.read_u32::<LittleEndian>()?), dialect),
            left: u64::from(reader.read_u32::<LittleEndian>()?),
            right: u64::from(reader.read_u32::<LittleEndian>()?),
        },
    };
    Ok(entry)
}

pub fn write_tree_entry<W: Write>(
    writer: &mut W,
    dialect: &Dialect,
    entry: &RawTreeEntry,
) -> Result<()> {
    match dialect.family {
        Family::Bits32 => {
            writer.write_u16::<LittleEndian>(narrow16(sentinel_to(entry.compare_bit, dialect))?)?;
            writer.write_u16::<LittleEndian>(narrow16(sentinel_to(entry.data_id, dialect))?)?;
            writer.write_u16::<LittleEndian>(narrow16(entry.left)?)?;
            writer.write_u16::<LittleEndian>(narrow16(entry.right)?)?;
        }
        Family::Bits64 => {
            writer.write_u32::<LittleEndian>(narrow32(sentinel_to(entry.compare_bit, dialect))?)?;
            writer.write_u32::<LittleEndian>(narrow32(sentinel_to(entry.data_id, dialect))?)?;
            writer.write_u32::<LittleEndian>(narrow32(entry.left)?)?;
            writer.write_u32::<LittleEndian>(narrow32(entry.right)?)?;
        }
    }
    Ok(())
}

pub fn read_name_entry<R: Read>(reader: &mut R, dialect: &Dialect) -> Result<ArchiveKey> {
    let mut raw = [0u8; crate::key::MAX_KEY_LEN];
    reader.read_exact(&mut raw[..dialect.key_len])?;
    Ok(ArchiveKey::from_raw(&raw[..dialect.key_len]))
}

pub fn write_name_entry<W: Write>(
    writer: &mut W,
    dialect: &Dialect,
    key: &ArchiveKey,
) -> Result<()> {
    debug_assert_eq!(key.as_bytes().len(), dialect.key_len);
    writer.write_all(key.as_bytes())?;
    Ok(())
}

pub fn read_data_entry<R: Read>(reader: &mut R, dialect: &Dialect) -> Result<DataEntry> {
    let entry = match dialect.family {
        Family::Bits32 => DataEntry {
            offset: u64::from(reader.read_u32::<LittleEndian>()?),
            full_size: u64::from(reader.read_u32::<LittleEndian>()?),
            compressed_size: u64::from(reader.read_u32::<LittleEndian>()?),
        },
        Family::Bits64 => DataEntry {
            offset: reader.read_u64::<LittleEndian>()?,
            full_size: reader.read_u64::<LittleEndian>()?,
            compressed_size: reader.read_u64::<LittleEndian>()?,
        },
    };
    Ok(entry)
}

pub fn write_data_entry<W: Write>(
    writer: &mut W,
    dialect: &Dialect,
    entry: &DataEntry,
) -> Result<()> {
    match dialect.family {
        Family::Bits32 => {
            writer.write_u32::<LittleEndian>(narrow32(entry.offset)?)?;
            writer.write_u32::<LittleEndian>(narrow32(entry.full_size)?)?;
            writer.write_u32::<LittleEndian>(narrow32(entry.compressed_size)?)?;
        }
        Family::Bits64 => {
            writer.write_u64::<LittleEndian>(entry.offset)?;
            writer.write_u64::<LittleEndian>(entry.full_size)?;
            writer.write_u64::<LittleEndian>(entry.compressed_size)?;
        }
    }
    Ok(())
}

/// Normalize an on-disk all-ones value to [`INVALID`].
fn widen(value: u64, dialect: &Dialect) -> u64 {
    if value == dialect.sentinel() {
        INVALID
    } else {
        value
    }
}

/// Map [`INVALID`] back to the dialect-width sentinel.
fn sentinel_to(value: u64, dialect: &Dialect) -> u64 {
    if value == INVALID {
        dialect.sentinel()
    } else {
        value
    }
}

fn narrow16(value: u64) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Mdb1Error::InvalidInput(format!("value {value:#x} exceeds 16-bit field")))
}

fn narrow32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Mdb1Error::InvalidInput(format!("value {value:#x} exceeds 32-bit field")))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::dialect::{DSCS, DSTS};

    #[test]
    fn header_round_trips_both_families() {
        let header = Header {
            file_entry_count: 12,
            file_name_count: 12,
            data_entry_count: 11,
            data_start: 0x1000,
            total_size: 0x4000,
        };

        for dialect in [DSCS, DSTS] {
            let mut buf = Vec::new();
            write_header(&mut buf, &dialect, &header).unwrap();
            assert_eq!(buf.len() as u64, dialect.header_len());

            let back = read_header(&mut Cursor::new(&buf), &dialect).unwrap();
            assert_eq!(back.file_entry_count, header.file_entry_count);
            assert_eq!(back.data_start, header.data_start);
            assert_eq!(back.total_size, header.total_size);
        }
    }

    #[test]
    fn sentinel_normalizes_per_family() {
        let root = RawTreeEntry {
            compare_bit: INVALID,
            data_id: INVALID,
            left: 0,
            right: 1,
        };

        for dialect in [DSCS, DSTS] {
            let mut buf = Vec::new();
            write_tree_entry(&mut buf, &dialect, &root).unwrap();
            assert_eq!(buf.len() as u64, dialect.tree_entry_len());

            let back = read_tree_entry(&mut Cursor::new(&buf), &dialect).unwrap();
            assert_eq!(back.compare_bit, INVALID);
            assert_eq!(back.data_id, INVALID);
            assert_eq!(back.right, 1);
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 0x20]);
        assert!(matches!(
            read_header(&mut Cursor::new(&buf), &DSCS),
            Err(Mdb1Error::BadMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn oversized_values_do_not_narrow() {
        let entry = DataEntry {
            offset: u64::from(u32::MAX) + 1,
            full_size: 1,
            compressed_size: 1,
        };
        let mut buf = Vec::new();
        assert!(write_data_entry(&mut buf, &DSCS, &entry).is_err());
        assert!(write_data_entry(&mut buf, &DSTS, &entry).is_ok());
    }
}
