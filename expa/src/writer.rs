//! Table-file writing: the inverse of the reader.

use std::fs;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::error::{ExpaError, Result};
use crate::row::pack_row;
use crate::types::TableFile;
use crate::variant::TableVariant;
use crate::{CHNK_MAGIC, EXPA_MAGIC};

/// Write a table file to `target`.
pub fn write_table_file(file: &TableFile, target: &Path, variant: &TableVariant) -> Result<()> {
    if target.exists() && !target.is_file() {
        return Err(ExpaError::InvalidInput(format!(
            "target exists and is not a file: {}",
            target.display()
        )));
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut buf: Vec<u8> = Vec::new();
    buf.write_u32::<LittleEndian>(EXPA_MAGIC)?;
    buf.write_u32::<LittleEndian>(file.tables.len() as u32)?;

    // Chunk entries accumulate across all tables, offsets rebased to the
    // start of their row as it is laid down.
    let mut chunks: Vec<(u32, Vec<u8>)> = Vec::new();

    for table in &file.tables {
        pad(&mut buf, variant.align_step);

        let name_len = (table.name.len() + 1).div_ceil(4) * 4;
        buf.write_u32::<LittleEndian>(name_len as u32)?;
        buf.extend_from_slice(table.name.as_bytes());
        buf.resize(buf.len() + (name_len - table.name.len()), 0);

        if variant.inline_types {
            buf.write_u32::<LittleEndian>(table.structure.len() as u32)?;
            for entry in table.structure.entries() {
                buf.write_u32::<LittleEndian>(entry.ty.tag())?;
            }
        }

        buf.write_u32::<LittleEndian>(table.structure.raw_size())?;
        buf.write_u32::<LittleEndian>(table.rows.len() as u32)?;

        pad(&mut buf, 8);

        for row in &table.rows {
            let start = u32::try_from(buf.len())
                .map_err(|_| ExpaError::InvalidInput("table file exceeds 4 GiB".into()))?;
            let packed = pack_row(&table.structure, row)?;
            buf.extend_from_slice(&packed.bytes);
            for chunk in packed.chunks {
                chunks.push((start + chunk.offset, chunk.payload));
            }
        }

        debug!(
            "table {:?}: {} rows, stride {}",
            table.name,
            table.rows.len(),
            table.structure.expa_size()
        );
    }

    pad(&mut buf, variant.align_step);
    buf.write_u32::<LittleEndian>(CHNK_MAGIC)?;
    buf.write_u32::<LittleEndian>(chunks.len() as u32)?;
    for (offset, payload) in &chunks {
        buf.write_u32::<LittleEndian>(*offset)?;
        buf.write_u32::<LittleEndian>(payload.len() as u32)?;
        buf.extend_from_slice(payload);
    }

    let parent = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => p,
        None => Path::new("."),
    };
    let temp = tempfile::NamedTempFile::new_in(parent)?;
    fs::write(temp.path(), &buf)?;
    temp.persist(target).map_err(|e| ExpaError::Io(e.error))?;
    Ok(())
}

fn pad(buf: &mut Vec<u8>, step: u64) {
    let len = buf.len() as u64;
    buf.resize((len.div_ceil(step) * step) as usize, 0);
}
