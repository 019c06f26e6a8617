//! Obfuscation and save-file crypto for the MVGL game-archive family.
//!
//! Archives and loose files are scrambled with a positional XOR pad
//! ([`xor_in_place`], [`XorReader`], [`XorWriter`]); PC save files use a
//! block cipher with fixed keys ([`encrypt_save`], [`decrypt_save`]).

mod keys;

pub mod error;
pub mod savefile;
pub mod stream;
pub mod xor;

pub use error::{CryptoError, Result};
pub use savefile::{decrypt_save, encrypt_save};
pub use stream::{XorReader, XorWriter};
pub use xor::{xor_in_place, xor_into, PAD_LEN};
