//! Error types for audio-bank operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Afs2Error>;

#[derive(Error, Debug)]
pub enum Afs2Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid audio-bank magic: {0:#010x}")]
    BadMagic(u32),

    #[error("corrupt audio bank: {0}")]
    Corrupt(String),
}
