//! Error types for table-file operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExpaError>;

#[derive(Error, Debug)]
pub enum ExpaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid table-file magic: {0:#010x}")]
    BadMagic(u32),

    #[error("corrupt table file: {0}")]
    Corrupt(String),

    #[error("structure size {computed} doesn't match entry size {declared}")]
    SchemaMismatch { computed: u32, declared: u32 },

    #[error("schema descriptor {path}: {detail}")]
    Descriptor { path: String, detail: String },

    #[error("bad cell value: {0}")]
    Value(String),

    #[error("CSV error: {0}")]
    Csv(String),
}
