//! EXPA/CHNK table container codec.
//!
//! A table file is a sequence of named, fixed-stride row tables followed
//! by a chunk section holding the variable-length payloads their rows
//! point into. Row layouts come from external JSON descriptors (see
//! [`SchemaRegistry`]) and, in the 64-bit dialect family, from inline
//! type-tag lists. A CSV bridge exports tables to delimited text and
//! rebuilds containers from it.

pub mod csv;
pub mod error;
pub mod reader;
pub mod row;
pub mod schema;
pub mod types;
pub mod variant;
pub mod writer;

pub use csv::{export_csv, import_csv};
pub use error::{ExpaError, Result};
pub use reader::read_table_file;
pub use row::{pack_row, ChunkEntry, PackedRow};
pub use schema::SchemaRegistry;
pub use types::{EntryType, Structure, StructureEntry, Table, TableFile, Value};
pub use variant::TableVariant;
pub use writer::write_table_file;

/// Magic of the table section, `EXPA`.
pub const EXPA_MAGIC: u32 = 0x4150_5845;

/// Magic of the trailing chunk section, `CHNK`.
pub const CHNK_MAGIC: u32 = 0x4B4E_4843;
