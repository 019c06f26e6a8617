//! Error types for archive operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Mdb1Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid archive magic: {0:#010x}")]
    BadMagic(u32),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("corrupt payload for {name}: {detail}")]
    CorruptPayload { name: String, detail: String },

    #[error("file not found in archive: {0}")]
    NotFound(String),

    #[error("compressor error: {0}")]
    Compressor(#[from] mvgl_compress::CompressError),
}

pub type Result<T> = std::result::Result<T, Mdb1Error>;
