//! PC save-file encryption.
//!
//! Save files are AES-128-CBC with fixed key and IV; the container adds
//! nothing of its own, so these are plain whole-buffer transforms.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tracing::debug;

use crate::error::{CryptoError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const SAVE_KEY: [u8; 16] = [
    0x9e, 0x41, 0x5a, 0x21, 0xd3, 0x7c, 0x86, 0x2f, 0x64, 0xb9, 0x05, 0xee, 0x18, 0xc0, 0x73, 0xaa,
];
const SAVE_IV: [u8; 16] = [
    0x2b, 0xf1, 0x96, 0x04, 0xc8, 0x3d, 0x5e, 0x77, 0xa2, 0x10, 0xdb, 0x49, 0x8c, 0x65, 0x3f, 0xe0,
];

/// Encrypt a decrypted save buffer.
pub fn encrypt_save(plain: &[u8]) -> Vec<u8> {
    debug!("encrypting save data ({} bytes)", plain.len());
    Aes128CbcEnc::new(&SAVE_KEY.into(), &SAVE_IV.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
}

/// Decrypt an encrypted save buffer.
pub fn decrypt_save(cipher: &[u8]) -> Result<Vec<u8>> {
    if cipher.is_empty() || cipher.len() % 16 != 0 {
        return Err(CryptoError::Misaligned(cipher.len()));
    }

    debug!("decrypting save data ({} bytes)", cipher.len());
    Aes128CbcDec::new(&SAVE_KEY.into(), &SAVE_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(cipher)
        .map_err(|_| CryptoError::InvalidPadding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_round_trip() {
        let plain = b"party roster and play time".to_vec();
        let cipher = encrypt_save(&plain);
        assert_ne!(cipher, plain);
        assert_eq!(cipher.len() % 16, 0);
        assert_eq!(decrypt_save(&cipher).unwrap(), plain);
    }

    #[test]
    fn decrypt_rejects_misaligned_input() {
        assert!(matches!(
            decrypt_save(&[0u8; 15]),
            Err(CryptoError::Misaligned(15))
        ));
        assert!(matches!(decrypt_save(&[]), Err(CryptoError::Misaligned(0))));
    }

    #[test]
    fn decrypt_rejects_garbage() {
        // A random block will not carry valid PKCS#7 padding.
        let garbage = [0xa7u8; 32];
        assert!(matches!(
            decrypt_save(&garbage),
            Err(CryptoError::InvalidPadding)
        ));
    }
}
