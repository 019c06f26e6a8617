//! CSV bridge: one file per table, schema-aware import.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ExpaError, Result};
use crate::schema::SchemaRegistry;
use crate::types::{EntryType, Structure, StructureEntry, Table, TableFile, Value};

/// Export every table as `NNN_<name>.csv` under `target`.
pub fn export_csv(file: &TableFile, target: &Path) -> Result<()> {
    if target.exists() && !target.is_dir() {
        return Err(ExpaError::InvalidInput(format!(
            "target exists and is not a directory: {}",
            target.display()
        )));
    }
    fs::create_dir_all(target)?;

    for (index, table) in file.tables.iter().enumerate() {
        let path = target.join(format!("{index:03}_{}.csv", table.name));
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;

        writer
            .write_record(table.structure.entries().iter().map(|e| e.name.as_str()))
            .map_err(csv_error)?;

        for row in &table.rows {
            let record = table
                .structure
                .entries()
                .iter()
                .zip(row)
                .map(|(entry, value)| cell_text(entry, value))
                .collect::<Result<Vec<String>>>()?;
            writer.write_record(&record).map_err(csv_error)?;
        }
        writer.flush()?;

        debug!("wrote {}", path.display());
    }

    Ok(())
}

/// Import a directory of CSV files, one table per file. File order (and
/// so table order) is the lexicographic file-name order; the table name
/// is the file stem with its 3-digit sequence prefix removed. Schemas
/// resolved from the registry take priority over types derived from the
/// header row.
pub fn import_csv(source: &Path, registry: &SchemaRegistry) -> Result<TableFile> {
    if !source.is_dir() {
        return Err(ExpaError::InvalidInput(format!(
            "source is not a directory: {}",
            source.display()
        )));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(source)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let source_str = source.display().to_string();
    let mut tables = Vec::with_capacity(files.len());

    for path in files {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExpaError::InvalidInput(format!("unusable file name: {path:?}")))?;
        let name = stem.get(4..).ok_or_else(|| {
            ExpaError::InvalidInput(format!(
                "file name lacks the NNN_ sequence prefix: {stem}"
            ))
        })?;

        let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
        let header: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();

        let structure = structure_for(&header, &source_str, name, registry)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            if record.len() != structure.len() {
                return Err(ExpaError::Csv(format!(
                    "row in {stem}.csv has {} cells, expected {}",
                    record.len(),
                    structure.len()
                )));
            }
            let row = structure
                .entries()
                .iter()
                .zip(record.iter())
                .map(|(entry, text)| parse_cell(entry.ty, text))
                .collect::<Result<Vec<Value>>>()?;
            rows.push(row);
        }

        tables.push(Table {
            name: name.to_string(),
            structure,
            rows,
        });
    }

    Ok(TableFile { tables })
}

/// Registry schema when it exists and fits; header-derived otherwise.
/// Headers are permissive (a plain field name yields `empty`), so the
/// descriptor is authoritative whenever the lengths line up.
fn structure_for(
    header: &[String],
    source: &str,
    table_name: &str,
    registry: &SchemaRegistry,
) -> Result<Structure> {
    let from_file = registry.resolve(source, table_name)?;
    if !from_file.is_empty() && from_file.len() == header.len() {
        return Ok(Structure::new(from_file));
    }

    Ok(Structure::new(
        header
            .iter()
            .map(|cell| StructureEntry::new(cell.clone(), header_type(cell)))
            .collect(),
    ))
}

/// Type from a header cell: everything before the last space (the whole
/// cell when there is none), so auto-generated names like `int32 0` or
/// `int array 5` carry their type.
fn header_type(cell: &str) -> EntryType {
    let name = cell.rfind(' ').map_or(cell, |i| &cell[..i]);
    EntryType::from_name(name)
}

fn cell_text(entry: &StructureEntry, value: &Value) -> Result<String> {
    let text = match (entry.ty, value) {
        (EntryType::Int8, Value::Int8(v)) => v.to_string(),
        (EntryType::Int16, Value::Int16(v)) => v.to_string(),
        (EntryType::Int32, Value::Int32(v)) => v.to_string(),
        (EntryType::Float, Value::Float(v)) => v.to_string(),
        (EntryType::Bool, Value::Bool(v)) => v.to_string(),
        (ty, Value::String(s)) if ty.is_string() => s.clone(),
        (EntryType::IntArray, Value::IntArray(values)) => {
            let parts: Vec<String> = values.iter().map(i32::to_string).collect();
            parts.join(" ")
        }
        (EntryType::Empty | EntryType::Unk1, _) => String::new(),
        _ => {
            return Err(ExpaError::Value(format!(
                "field {:?} is {} but the cell holds {}",
                entry.name,
                entry.ty.type_name(),
                value.kind()
            )))
        }
    };
    Ok(text)
}

fn parse_cell(ty: EntryType, text: &str) -> Result<Value> {
    let value = match ty {
        EntryType::Int8 => Value::Int8(parse_int(text)? as i8),
        EntryType::Int16 => Value::Int16(parse_int(text)? as i16),
        EntryType::Int32 => Value::Int32(parse_int(text)?),
        EntryType::Float => Value::Float(
            text.parse::<f32>()
                .map_err(|_| ExpaError::Csv(format!("bad float cell {text:?}")))?,
        ),
        EntryType::Bool => Value::Bool(text == "true"),
        EntryType::String | EntryType::String2 | EntryType::String3 => {
            Value::String(text.to_string())
        }
        EntryType::IntArray => Value::IntArray(
            text.split_whitespace()
                .map(parse_int)
                .collect::<Result<Vec<i32>>>()?,
        ),
        EntryType::Empty | EntryType::Unk1 => Value::Empty,
    };
    Ok(value)
}

fn parse_int(text: &str) -> Result<i32> {
    text.parse::<i32>()
        .map_err(|_| ExpaError::Csv(format!("bad integer cell {text:?}")))
}

fn csv_error(e: csv::Error) -> ExpaError {
    ExpaError::Csv(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_cells_carry_types_for_auto_names() {
        assert_eq!(header_type("int32 0"), EntryType::Int32);
        assert_eq!(header_type("int array 5"), EntryType::IntArray);
        assert_eq!(header_type("float 12"), EntryType::Float);
        assert_eq!(header_type("plain_name"), EntryType::Empty);
    }

    #[test]
    fn cell_parsing_per_type() {
        assert_eq!(parse_cell(EntryType::Int32, "-17").unwrap(), Value::Int32(-17));
        assert_eq!(parse_cell(EntryType::Bool, "true").unwrap(), Value::Bool(true));
        assert_eq!(parse_cell(EntryType::Bool, "1").unwrap(), Value::Bool(false));
        assert_eq!(
            parse_cell(EntryType::IntArray, "1 2 3").unwrap(),
            Value::IntArray(vec![1, 2, 3])
        );
        assert_eq!(
            parse_cell(EntryType::IntArray, "").unwrap(),
            Value::IntArray(vec![])
        );
        assert!(parse_cell(EntryType::Int32, "twelve").is_err());
    }
}
