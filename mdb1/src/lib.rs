//! MDB1 archive engine.
//!
//! Archives index their contents with a PATRICIA-style trie over
//! fixed-width filename keys, backed by three parallel tables (tree,
//! names, data) in front of a concatenated payload region. Four dialects
//! share the layout and differ in integer widths, key length, payload
//! compressor and whole-file obfuscation; see [`dialect`].
//!
//! [`ArchiveReader`] parses an index and extracts files; [`pack_archive`]
//! rebuilds an archive from a directory, byte-stable for a given input
//! and mode.

pub mod dialect;
pub mod error;
pub mod format;
pub mod key;
mod pool;
pub mod reader;
pub mod tree;
pub mod writer;

pub use dialect::{Dialect, Family, DSCS, DSCS_CONSOLE, DSTS, THL};
pub use error::{Mdb1Error, Result};
pub use format::{DataEntry, MDB1_MAGIC, MDB1_MAGIC_OBFUSCATED};
pub use key::ArchiveKey;
pub use reader::{ArchiveReader, ExtractOptions, ExtractSummary};
pub use writer::{pack_archive, CompressMode};
