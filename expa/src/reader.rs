//! Table-file reading.
//!
//! The whole file is slurped once. A first pass walks the table headers
//! and skips over row data; the trailing chunk section is then decoded
//! into a map from pointer-slot file offset to payload, and a second
//! pass decodes rows against that map. Nothing is ever patched back
//! into the buffer.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::error::{ExpaError, Result};
use crate::row::{unpack_row, ChunkMap};
use crate::schema::SchemaRegistry;
use crate::types::{EntryType, Structure, StructureEntry, Table, TableFile};
use crate::variant::TableVariant;
use crate::{CHNK_MAGIC, EXPA_MAGIC};

struct PendingTable {
    name: String,
    data_offset: u64,
    row_count: u32,
    stride: u64,
    structure: Structure,
}

/// Read a table file, resolving row schemas through `registry`.
pub fn read_table_file(
    path: &Path,
    variant: &TableVariant,
    registry: &SchemaRegistry,
) -> Result<TableFile> {
    if !path.is_file() {
        return Err(ExpaError::InvalidInput(format!(
            "source is not a file: {}",
            path.display()
        )));
    }
    let content = fs::read(path)?;
    let source_path = path.display().to_string();
    let mut cur = Cursor::new(content.as_slice());

    let magic = cur.read_u32::<LittleEndian>()?;
    if magic != EXPA_MAGIC {
        return Err(ExpaError::BadMagic(magic));
    }
    let table_count = cur.read_u32::<LittleEndian>()?;
    // Each table header occupies at least a name length and two counts.
    if u64::from(table_count) * 12 > content.len() as u64 {
        return Err(ExpaError::Corrupt(format!(
            "table count {table_count} cannot fit in {} bytes",
            content.len()
        )));
    }

    debug!("{source_path}: {table_count} tables");

    let mut pending = Vec::with_capacity(table_count as usize);
    for _ in 0..table_count {
        align(&mut cur, variant.align_step);

        let name_len = cur.read_u32::<LittleEndian>()? as usize;
        let name = read_name(&mut cur, &content, name_len)?;

        let structure = resolve_structure(&mut cur, variant, registry, &source_path, &name)?;
        let entry_size = cur.read_u32::<LittleEndian>()?;
        let row_count = cur.read_u32::<LittleEndian>()?;

        align(&mut cur, 8);
        let data_offset = cur.position();
        let stride = u64::from(entry_size.div_ceil(8) * 8);

        let rows_end = data_offset + stride * u64::from(row_count);
        if rows_end > content.len() as u64 {
            return Err(ExpaError::Corrupt(format!(
                "rows of table {name:?} extend past end of file"
            )));
        }
        cur.set_position(rows_end);

        let computed = structure.expa_size();
        if computed != entry_size.div_ceil(8) * 8 {
            return Err(ExpaError::SchemaMismatch {
                computed,
                declared: entry_size,
            });
        }

        pending.push(PendingTable {
            name,
            data_offset,
            row_count,
            stride,
            structure,
        });
    }

    align(&mut cur, variant.align_step);
    let chunks = read_chunk_section(&mut cur, &content)?;

    let mut tables = Vec::with_capacity(pending.len());
    for table in pending {
        let mut rows = Vec::with_capacity(table.row_count as usize);
        for i in 0..u64::from(table.row_count) {
            let base = table.data_offset + i * table.stride;
            let bytes = &content[base as usize..(base + table.stride) as usize];
            rows.push(unpack_row(&table.structure, bytes, base, &chunks)?);
        }
        tables.push(Table {
            name: table.name,
            structure: table.structure,
            rows,
        });
    }

    Ok(TableFile { tables })
}

fn read_name(cur: &mut Cursor<&[u8]>, content: &[u8], name_len: usize) -> Result<String> {
    let start = cur.position() as usize;
    let end = start
        .checked_add(name_len)
        .filter(|&e| e <= content.len())
        .ok_or_else(|| ExpaError::Corrupt("table name extends past end of file".into()))?;
    cur.set_position(end as u64);

    let raw = &content[start..end];
    let trimmed = &raw[..raw.iter().position(|&b| b == 0).unwrap_or(raw.len())];
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

/// Inline type tags (when the variant has them) reconciled against the
/// registry: a descriptor only supersedes the tags when its length and
/// types agree, since its job is naming fields, not redefining them.
fn resolve_structure(
    cur: &mut Cursor<&[u8]>,
    variant: &TableVariant,
    registry: &SchemaRegistry,
    source_path: &str,
    table_name: &str,
) -> Result<Structure> {
    let from_file = registry.resolve(source_path, table_name)?;

    if !variant.inline_types {
        return Ok(Structure::new(from_file));
    }

    let count = cur.read_u32::<LittleEndian>()?;
    let remaining = cur.get_ref().len() as u64 - cur.position();
    if u64::from(count) * 4 > remaining {
        return Err(ExpaError::Corrupt(format!(
            "type list of {count} entries extends past end of file"
        )));
    }
    let mut inline = Vec::with_capacity(count as usize);
    for j in 0..count {
        let tag = cur.read_u32::<LittleEndian>()?;
        let ty = EntryType::from_tag(tag).unwrap_or_else(|| {
            warn!("table {table_name:?}: unknown type tag {tag}, treating as empty");
            EntryType::Empty
        });
        inline.push(StructureEntry::new(format!("{} {j}", ty.type_name()), ty));
    }

    if from_file.len() == inline.len()
        && from_file.iter().zip(&inline).all(|(a, b)| a.ty == b.ty)
        && !from_file.is_empty()
    {
        Ok(Structure::new(from_file))
    } else {
        if !from_file.is_empty() {
            warn!("descriptor for {table_name:?} disagrees with inline types, ignoring it");
        }
        Ok(Structure::new(inline))
    }
}

fn read_chunk_section(cur: &mut Cursor<&[u8]>, content: &[u8]) -> Result<ChunkMap> {
    let magic = cur.read_u32::<LittleEndian>()?;
    if magic != CHNK_MAGIC {
        return Err(ExpaError::Corrupt(format!(
            "expected chunk section, found {magic:#010x}"
        )));
    }
    let count = cur.read_u32::<LittleEndian>()?;

    let mut chunks = ChunkMap::new();
    for _ in 0..count {
        let target = u64::from(cur.read_u32::<LittleEndian>()?);
        let size = cur.read_u32::<LittleEndian>()? as usize;

        let start = cur.position() as usize;
        let end = start
            .checked_add(size)
            .filter(|&e| e <= content.len())
            .ok_or_else(|| ExpaError::Corrupt("chunk payload extends past end of file".into()))?;
        chunks.insert(target, content[start..end].to_vec());
        cur.set_position(end as u64);
    }

    Ok(chunks)
}

fn align(cur: &mut Cursor<&[u8]>, step: u64) {
    let pos = cur.position();
    cur.set_position(pos.div_ceil(step) * step);
}
