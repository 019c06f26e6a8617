//! Error types for crypto operations

use thiserror::Error;

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("save data is not a whole number of cipher blocks: {0} bytes")]
    Misaligned(usize),

    #[error("save data failed to decrypt: invalid padding")]
    InvalidPadding,
}
