//! Positional XOR obfuscation over the combined key pad.
//!
//! Obfuscated archives are scrambled whole-file with a fixed pad of
//! `997 * 991 = 988,027` bytes, indexed by absolute file offset modulo the
//! pad length. Applying the same transform twice restores the input.

use std::sync::OnceLock;

use crate::keys::{KEY_A, KEY_B};

/// Length of the combined pad in bytes.
pub const PAD_LEN: usize = KEY_A.len() * KEY_B.len();

static PAD: OnceLock<Box<[u8]>> = OnceLock::new();

/// The combined pad, materialized once per process.
fn pad() -> &'static [u8] {
    PAD.get_or_init(|| {
        let mut pad = vec![0u8; PAD_LEN];
        for (i, byte) in pad.iter_mut().enumerate() {
            *byte = KEY_A[i % KEY_A.len()] ^ KEY_B[i % KEY_B.len()];
        }
        pad.into_boxed_slice()
    })
}

/// XOR `buf` in place against the pad, where `buf[0]` sits at absolute
/// file offset `abs_offset`.
pub fn xor_in_place(buf: &mut [u8], abs_offset: u64) {
    let pad = pad();
    let mut idx = (abs_offset % PAD_LEN as u64) as usize;
    let mut rest = buf;

    while !rest.is_empty() {
        let take = rest.len().min(PAD_LEN - idx);
        let (head, tail) = rest.split_at_mut(take);
        xor_block(head, &pad[idx..idx + take]);
        rest = tail;
        idx += take;
        if idx == PAD_LEN {
            idx = 0;
        }
    }
}

/// Copy `src` into `dst` and XOR against the pad at `abs_offset`.
///
/// `src` and `dst` must have equal lengths.
pub fn xor_into(src: &[u8], dst: &mut [u8], abs_offset: u64) {
    dst.copy_from_slice(src);
    xor_in_place(dst, abs_offset);
}

// Eight bytes per step, byte-wise tail.
fn xor_block(dst: &mut [u8], key: &[u8]) {
    let mut dst_words = dst.chunks_exact_mut(8);
    let mut key_words = key.chunks_exact(8);

    for (d, k) in (&mut dst_words).zip(&mut key_words) {
        let word = u64::from_le_bytes(d.try_into().expect("chunk is 8 bytes"))
            ^ u64::from_le_bytes(k.try_into().expect("chunk is 8 bytes"));
        d.copy_from_slice(&word.to_le_bytes());
    }

    for (d, k) in dst_words
        .into_remainder()
        .iter_mut()
        .zip(key_words.remainder())
    {
        *d ^= *k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_xor_is_identity() {
        let original: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        for offset in [0u64, 1, 7, 988_020, 988_027, 5_000_000] {
            let mut buf = original.clone();
            xor_in_place(&mut buf, offset);
            assert_ne!(buf, original, "pad must actually change the data");
            xor_in_place(&mut buf, offset);
            assert_eq!(buf, original, "offset {offset}");
        }
    }

    #[test]
    fn offset_selects_pad_position() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        xor_in_place(&mut a, 0);
        xor_in_place(&mut b, 8);
        assert_eq!(a[8..], b[..8], "pad windows must overlap by offset");
    }

    #[test]
    fn wraps_at_pad_boundary() {
        let mut long = vec![0u8; PAD_LEN + 32];
        xor_in_place(&mut long, 0);
        assert_eq!(long[..32], long[PAD_LEN..], "pad repeats after PAD_LEN");
    }

    #[test]
    fn xor_into_matches_in_place() {
        let src: Vec<u8> = (0..100).collect();
        let mut dst = vec![0u8; 100];
        xor_into(&src, &mut dst, 13);

        let mut expected = src.clone();
        xor_in_place(&mut expected, 13);
        assert_eq!(dst, expected);
    }
}
