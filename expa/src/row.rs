//! The row codec: one canonical layout walk shared by packing, unpacking
//! and stride computation.
//!
//! Rows are fixed-stride. Scalars sit at aligned offsets; consecutive
//! booleans share a 32-bit group at the offset where their run began,
//! flushed by the first non-boolean field (or the 33rd boolean).
//! Variable-length cells (strings, int arrays) occupy a zeroed 64-bit
//! pointer slot in the row and park their payload in the trailing chunk
//! section; decoding resolves those slots through an offset-keyed chunk
//! map instead of patched pointers.

use std::collections::HashMap;

use crate::error::{ExpaError, Result};
use crate::types::{EntryType, Structure, StructureEntry, Value};

/// Chunk payloads keyed by the absolute file offset of the pointer slot
/// they back.
pub(crate) type ChunkMap = HashMap<u64, Vec<u8>>;

/// A chunk payload produced while packing, at an offset relative to the
/// start of its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub offset: u32,
    pub payload: Vec<u8>,
}

/// A packed row: `expa_size` bytes plus any out-of-line payloads.
#[derive(Debug, Clone)]
pub struct PackedRow {
    pub bytes: Vec<u8>,
    pub chunks: Vec<ChunkEntry>,
}

/// Where one field lands in the row.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldSlot {
    Scalar { at: u32 },
    Bool { word: u32, bit: u32 },
}

#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub slots: Vec<FieldSlot>,
    pub raw_size: u32,
}

/// The canonical walk. Everything that needs to agree on offsets goes
/// through here.
pub(crate) fn layout(structure: &Structure) -> Layout {
    let mut offset = 0u32;
    let mut bits = 0u32;
    let mut slots = Vec::with_capacity(structure.len());

    for entry in structure.entries() {
        let ty = entry.ty;

        if ty != EntryType::Bool || bits >= 32 {
            if bits > 0 {
                offset += 4;
                bits = 0;
            }
            let align = ty.align();
            if align > 0 {
                offset = offset.div_ceil(align) * align;
            }
        }

        if ty == EntryType::Bool {
            slots.push(FieldSlot::Bool {
                word: offset,
                bit: bits,
            });
            bits += 1;
        } else {
            slots.push(FieldSlot::Scalar { at: offset });
            offset += ty.size();
        }
    }

    if bits > 0 {
        offset += 4;
    }

    Layout {
        slots,
        raw_size: offset,
    }
}

/// Pack one row of values against a structure.
pub fn pack_row(structure: &Structure, row: &[Value]) -> Result<PackedRow> {
    if row.len() != structure.len() {
        return Err(ExpaError::Value(format!(
            "row has {} cells but the structure has {} fields",
            row.len(),
            structure.len()
        )));
    }

    let layout = layout(structure);
    let mut bytes = vec![0u8; structure.expa_size() as usize];
    let mut chunks = Vec::new();
    let mut bool_words: HashMap<u32, u32> = HashMap::new();

    for ((entry, value), slot) in structure.entries().iter().zip(row).zip(&layout.slots) {
        match *slot {
            FieldSlot::Bool { word, bit } => {
                let Value::Bool(set) = value else {
                    return Err(type_error(entry, value));
                };
                if *set {
                    *bool_words.entry(word).or_default() |= 1 << bit;
                }
            }
            FieldSlot::Scalar { at } => {
                pack_scalar(entry, value, at, &mut bytes, &mut chunks)?;
            }
        }
    }

    for (word, value) in bool_words {
        let at = word as usize;
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    Ok(PackedRow { bytes, chunks })
}

fn pack_scalar(
    entry: &StructureEntry,
    value: &Value,
    at: u32,
    bytes: &mut [u8],
    chunks: &mut Vec<ChunkEntry>,
) -> Result<()> {
    let at_usize = at as usize;
    match (entry.ty, value) {
        (EntryType::Int8, Value::Int8(v)) => bytes[at_usize] = *v as u8,
        (EntryType::Int16, Value::Int16(v)) => {
            bytes[at_usize..at_usize + 2].copy_from_slice(&v.to_le_bytes());
        }
        (EntryType::Int32, Value::Int32(v)) => {
            bytes[at_usize..at_usize + 4].copy_from_slice(&v.to_le_bytes());
        }
        (EntryType::Float, Value::Float(v)) => {
            bytes[at_usize..at_usize + 4].copy_from_slice(&v.to_le_bytes());
        }
        (ty, Value::String(s)) if ty.is_string() => {
            // Pointer slot stays zero; non-empty strings go out of line,
            // NUL-terminated with one spare NUL, padded to 4.
            if !s.is_empty() {
                let padded = (s.len() + 2).div_ceil(4) * 4;
                let mut payload = vec![0u8; padded];
                payload[..s.len()].copy_from_slice(s.as_bytes());
                chunks.push(ChunkEntry {
                    offset: at,
                    payload,
                });
            }
        }
        (EntryType::IntArray, Value::IntArray(values)) => {
            let count = values.len() as u32;
            bytes[at_usize..at_usize + 4].copy_from_slice(&count.to_le_bytes());
            if !values.is_empty() {
                let mut payload = Vec::with_capacity(values.len() * 4);
                for v in values {
                    payload.extend_from_slice(&v.to_le_bytes());
                }
                chunks.push(ChunkEntry {
                    offset: at + 8,
                    payload,
                });
            }
        }
        (EntryType::Empty | EntryType::Unk1, _) => {}
        _ => return Err(type_error(entry, value)),
    }
    Ok(())
}

/// Unpack one row. `row_base` is the absolute file offset of the row,
/// used to resolve pointer slots through the chunk map.
pub(crate) fn unpack_row(
    structure: &Structure,
    bytes: &[u8],
    row_base: u64,
    chunks: &ChunkMap,
) -> Result<Vec<Value>> {
    let layout = layout(structure);
    let mut values = Vec::with_capacity(structure.len());

    for (entry, slot) in structure.entries().iter().zip(&layout.slots) {
        let value = match *slot {
            FieldSlot::Bool { word, bit } => {
                let word = read_u32(bytes, word)?;
                Value::Bool((word >> bit) & 1 == 1)
            }
            FieldSlot::Scalar { at } => unpack_scalar(entry, bytes, at, row_base, chunks)?,
        };
        values.push(value);
    }

    Ok(values)
}

fn unpack_scalar(
    entry: &StructureEntry,
    bytes: &[u8],
    at: u32,
    row_base: u64,
    chunks: &ChunkMap,
) -> Result<Value> {
    let at_usize = at as usize;
    let value = match entry.ty {
        EntryType::Int8 => Value::Int8(
            *bytes
                .get(at_usize)
                .ok_or_else(|| short_row(entry, bytes.len()))? as i8,
        ),
        EntryType::Int16 => Value::Int16(i16::from_le_bytes(
            field(bytes, at_usize, 2, entry)?.try_into().expect("len 2"),
        )),
        EntryType::Int32 => Value::Int32(i32::from_le_bytes(
            field(bytes, at_usize, 4, entry)?.try_into().expect("len 4"),
        )),
        EntryType::Float => Value::Float(f32::from_le_bytes(
            field(bytes, at_usize, 4, entry)?.try_into().expect("len 4"),
        )),
        EntryType::String | EntryType::String2 | EntryType::String3 => {
            match chunks.get(&(row_base + u64::from(at))) {
                Some(payload) => Value::String(cstr(payload)),
                None => Value::String(String::new()),
            }
        }
        EntryType::IntArray => {
            let count = u32::from_le_bytes(
                field(bytes, at_usize, 4, entry)?.try_into().expect("len 4"),
            ) as usize;
            if count == 0 {
                Value::IntArray(Vec::new())
            } else {
                let payload = chunks.get(&(row_base + u64::from(at) + 8)).ok_or_else(|| {
                    ExpaError::Corrupt(format!(
                        "missing chunk payload for int array {:?}",
                        entry.name
                    ))
                })?;
                if payload.len() < count * 4 {
                    return Err(ExpaError::Corrupt(format!(
                        "chunk payload for {:?} holds {} bytes, need {}",
                        entry.name,
                        payload.len(),
                        count * 4
                    )));
                }
                Value::IntArray(
                    payload[..count * 4]
                        .chunks_exact(4)
                        .map(|c| i32::from_le_bytes(c.try_into().expect("len 4")))
                        .collect(),
                )
            }
        }
        EntryType::Empty | EntryType::Unk1 => Value::Empty,
        EntryType::Bool => unreachable!("bools are handled by their slot kind"),
    };
    Ok(value)
}

fn field<'a>(
    bytes: &'a [u8],
    at: usize,
    len: usize,
    entry: &StructureEntry,
) -> Result<&'a [u8]> {
    bytes
        .get(at..at + len)
        .ok_or_else(|| short_row(entry, bytes.len()))
}

fn read_u32(bytes: &[u8], at: u32) -> Result<u32> {
    let at = at as usize;
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes(b.try_into().expect("len 4")))
        .ok_or_else(|| ExpaError::Corrupt(format!("row ends before offset {at}")))
}

fn short_row(entry: &StructureEntry, len: usize) -> ExpaError {
    ExpaError::Corrupt(format!(
        "row of {len} bytes ends before field {:?}",
        entry.name
    ))
}

/// NUL-terminated string out of a chunk payload.
fn cstr(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

fn type_error(entry: &StructureEntry, value: &Value) -> ExpaError {
    ExpaError::Value(format!(
        "field {:?} is {} but the cell holds {}",
        entry.name,
        entry.ty.type_name(),
        value.kind()
    ))
}
