//! The RC2 variant used on the wire.
//!
//! The block routine is ordinary RC2, but the key expansion is not the
//! RFC 2268 schedule: it grows the key material forward through the
//! permutation table and never folds in an effective-bits mask. The
//! deployed servers speak exactly this schedule, so it is reproduced
//! here verbatim and guarded by the tests below.

use std::fmt;

/// Permutation table from RFC 2268.
const PT: [u8; 256] = [
    0xD9, 0x78, 0xF9, 0xC4, 0x19, 0xDD, 0xB5, 0xED,
    0x28, 0xE9, 0xFD, 0x79, 0x4A, 0xA0, 0xD8, 0x9D,
    0xC6, 0x7E, 0x37, 0x83, 0x2B, 0x76, 0x53, 0x8E,
    0x62, 0x4C, 0x64, 0x88, 0x44, 0x8B, 0xFB, 0xA2,
    0x17, 0x9A, 0x59, 0xF5, 0x87, 0xB3, 0x4F, 0x13,
    0x61, 0x45, 0x6D, 0x8D, 0x09, 0x81, 0x7D, 0x32,
    0xBD, 0x8F, 0x40, 0xEB, 0x86, 0xB7, 0x7B, 0x0B,
    0xF0, 0x95, 0x21, 0x22, 0x5C, 0x6B, 0x4E, 0x82,
    0x54, 0xD6, 0x65, 0x93, 0xCE, 0x60, 0xB2, 0x1C,
    0x73, 0x56, 0xC0, 0x14, 0xA7, 0x8C, 0xF1, 0xDC,
    0x12, 0x75, 0xCA, 0x1F, 0x3B, 0xBE, 0xE4, 0xD1,
    0x42, 0x3D, 0xD4, 0x30, 0xA3, 0x3C, 0xB6, 0x26,
    0x6F, 0xBF, 0x0E, 0xDA, 0x46, 0x69, 0x07, 0x57,
    0x27, 0xF2, 0x1D, 0x9B, 0xBC, 0x94, 0x43, 0x03,
    0xF8, 0x11, 0xC7, 0xF6, 0x90, 0xEF, 0x3E, 0xE7,
    0x06, 0xC3, 0xD5, 0x2F, 0xC8, 0x66, 0x1E, 0xD7,
    0x08, 0xE8, 0xEA, 0xDE, 0x80, 0x52, 0xEE, 0xF7,
    0x84, 0xAA, 0x72, 0xAC, 0x35, 0x4D, 0x6A, 0x2A,
    0x96, 0x1A, 0xD2, 0x71, 0x5A, 0x15, 0x49, 0x74,
    0x4B, 0x9F, 0xD0, 0x5E, 0x04, 0x18, 0xA4, 0xEC,
    0xC2, 0xE0, 0x41, 0x6E, 0x0F, 0x51, 0xCB, 0xCC,
    0x24, 0x91, 0xAF, 0x50, 0xA1, 0xF4, 0x70, 0x39,
    0x99, 0x7C, 0x3A, 0x85, 0x23, 0xB8, 0xB4, 0x7A,
    0xFC, 0x02, 0x36, 0x5B, 0x25, 0x55, 0x97, 0x31,
    0x2D, 0x5D, 0xFA, 0x98, 0xE3, 0x8A, 0x92, 0xAE,
    0x05, 0xDF, 0x29, 0x10, 0x67, 0x6C, 0xBA, 0xC9,
    0xD3, 0x00, 0xE6, 0xCF, 0xE1, 0x9E, 0xA8, 0x2C,
    0x63, 0x16, 0x01, 0x3F, 0x58, 0xE2, 0x89, 0xA9,
    0x0D, 0x38, 0x34, 0x1B, 0xAB, 0x33, 0xFF, 0xB0,
    0xBB, 0x48, 0x0C, 0x5F, 0xB9, 0xB1, 0xCD, 0x2E,
    0xC5, 0xF3, 0xDB, 0x47, 0xE5, 0xA5, 0x9C, 0x77,
    0x0A, 0xA6, 0x20, 0x68, 0xFE, 0x7F, 0xC1, 0xAD,
];

/// Initial value of the chaining vector for both directions.
pub const INITIAL_IV: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from the CBC routines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Ciphertext length is not a multiple of the 8-byte block size.
    Misaligned {
        /// The offending input length.
        len: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { len } => {
                write!(f, "ciphertext length {len} is not a multiple of 8")
            }
        }
    }
}

impl std::error::Error for Error {}

// ─── Key expansion ───────────────────────────────────────────────────────────

/// A fully expanded RC2 key: 64 little-endian 16-bit words.
#[derive(Clone)]
pub struct ExpandedKey([u16; 64]);

impl ExpandedKey {
    /// Expand up to 128 key bytes into the 64-word schedule.
    ///
    /// Growth rule: `T[n] = PT[T[n-1] + T[i]]` for `i` counting up from
    /// zero, then `T[0] = PT[T[0]]`, then pack little-endian word
    /// pairs. An empty key expands as a single zero byte.
    pub fn expand(key: &[u8]) -> ExpandedKey {
        let mut t = [0u8; 128];
        let take = key.len().min(128);
        t[..take].copy_from_slice(&key[..take]);
        let mut len = take.max(1);

        let mut i = 0;
        while len < 128 {
            t[len] = PT[t[len - 1].wrapping_add(t[i]) as usize];
            len += 1;
            i += 1;
        }
        t[0] = PT[t[0] as usize];

        let mut words = [0u16; 64];
        for (word, pair) in words.iter_mut().zip(t.chunks_exact(2)) {
            *word = u16::from_le_bytes([pair[0], pair[1]]);
        }
        ExpandedKey(words)
    }
}

impl fmt::Debug for ExpandedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        write!(f, "ExpandedKey(..)")
    }
}

// ─── Block routine ───────────────────────────────────────────────────────────

/// One block is four little-endian words `d, c, b, a`, low word first.
fn load(block: &[u8]) -> (u16, u16, u16, u16) {
    let d = u16::from_le_bytes([block[0], block[1]]);
    let c = u16::from_le_bytes([block[2], block[3]]);
    let b = u16::from_le_bytes([block[4], block[5]]);
    let a = u16::from_le_bytes([block[6], block[7]]);
    (d, c, b, a)
}

fn store(block: &mut [u8], d: u16, c: u16, b: u16, a: u16) {
    block[0..2].copy_from_slice(&d.to_le_bytes());
    block[2..4].copy_from_slice(&c.to_le_bytes());
    block[4..6].copy_from_slice(&b.to_le_bytes());
    block[6..8].copy_from_slice(&a.to_le_bytes());
}

fn encrypt_block(k: &[u16; 64], block: &mut [u8]) {
    let (mut d, mut c, mut b, mut a) = load(block);

    for i in 0..16 {
        let j = i * 4;

        d = d.wrapping_add((c & !a).wrapping_add(b & a).wrapping_add(k[j]));
        d = d.rotate_left(1);
        c = c.wrapping_add((b & !d).wrapping_add(a & d).wrapping_add(k[j + 1]));
        c = c.rotate_left(2);
        b = b.wrapping_add((a & !c).wrapping_add(d & c).wrapping_add(k[j + 2]));
        b = b.rotate_left(3);
        a = a.wrapping_add((d & !b).wrapping_add(c & b).wrapping_add(k[j + 3]));
        a = a.rotate_left(5);

        // mash after rounds 4 and 10
        if i == 4 || i == 10 {
            d = d.wrapping_add(k[(a & 0x3f) as usize]);
            c = c.wrapping_add(k[(d & 0x3f) as usize]);
            b = b.wrapping_add(k[(c & 0x3f) as usize]);
            a = a.wrapping_add(k[(b & 0x3f) as usize]);
        }
    }

    store(block, d, c, b, a);
}

fn decrypt_block(k: &[u16; 64], block: &mut [u8]) {
    let (mut d, mut c, mut b, mut a) = load(block);

    for i in (0..16).rev() {
        let j = i * 4;

        a = a.rotate_right(5);
        a = a.wrapping_sub((d & !b).wrapping_add(c & b).wrapping_add(k[j + 3]));
        b = b.rotate_right(3);
        b = b.wrapping_sub((a & !c).wrapping_add(d & c).wrapping_add(k[j + 2]));
        c = c.rotate_right(2);
        c = c.wrapping_sub((b & !d).wrapping_add(a & d).wrapping_add(k[j + 1]));
        d = d.rotate_right(1);
        d = d.wrapping_sub((c & !a).wrapping_add(b & a).wrapping_add(k[j]));

        if i == 5 || i == 11 {
            a = a.wrapping_sub(k[(b & 0x3f) as usize]);
            b = b.wrapping_sub(k[(c & 0x3f) as usize]);
            c = c.wrapping_sub(k[(d & 0x3f) as usize]);
            d = d.wrapping_sub(k[(a & 0x3f) as usize]);
        }
    }

    store(block, d, c, b, a);
}

// ─── CBC mode ────────────────────────────────────────────────────────────────

/// Encrypt `plain` in CBC mode, advancing `iv`.
///
/// Output is padded to the next multiple of 8 with the pad length as
/// the fill byte; a full padding block is appended even when the input
/// is already block-aligned.
pub fn cbc_encrypt(key: &ExpandedKey, iv: &mut [u8; 8], plain: &[u8]) -> Vec<u8> {
    let pad = 8 - (plain.len() % 8);
    let mut out = Vec::with_capacity(plain.len() + pad);
    out.extend_from_slice(plain);
    out.resize(plain.len() + pad, pad as u8);

    for block in out.chunks_exact_mut(8) {
        for (byte, v) in block.iter_mut().zip(iv.iter()) {
            *byte ^= v;
        }
        encrypt_block(&key.0, block);
        iv.copy_from_slice(block);
    }
    out
}

/// Decrypt `cipher` in CBC mode, advancing `iv` and stripping the
/// padding recorded in the final plaintext byte.
pub fn cbc_decrypt(key: &ExpandedKey, iv: &mut [u8; 8], cipher: &[u8]) -> Result<Vec<u8>, Error> {
    if cipher.len() % 8 != 0 {
        return Err(Error::Misaligned { len: cipher.len() });
    }
    if cipher.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = cipher.to_vec();
    for (block, prev) in out.chunks_exact_mut(8).zip(cipher.chunks_exact(8)) {
        decrypt_block(&key.0, block);
        for (byte, v) in block.iter_mut().zip(iv.iter()) {
            *byte ^= v;
        }
        // the chaining vector follows the ciphertext, not the plaintext
        iv.copy_from_slice(prev);
    }

    let pad = out[out.len() - 1] as usize;
    out.truncate(out.len().saturating_sub(pad));
    Ok(out)
}

/// One-shot encrypt: expand `key`, start from the standard chaining
/// vector, and run CBC over `plain`.
pub fn encrypt(key: &[u8], plain: &[u8]) -> Vec<u8> {
    let expanded = ExpandedKey::expand(key);
    let mut iv = INITIAL_IV;
    cbc_encrypt(&expanded, &mut iv, plain)
}

/// One-shot decrypt counterpart of [`encrypt`].
pub fn decrypt(key: &[u8], cipher: &[u8]) -> Result<Vec<u8>, Error> {
    let expanded = ExpandedKey::expand(key);
    let mut iv = INITIAL_IV;
    cbc_decrypt(&expanded, &mut iv, cipher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_forty_bit_key() {
        let cipher = encrypt(b"siege", b"hello\0");
        assert_eq!(cipher.len(), 8);
        assert_eq!(decrypt(b"siege", &cipher).unwrap(), b"hello\0");
    }

    #[test]
    fn aligned_input_still_gains_a_padding_block() {
        let cipher = encrypt(b"key", &[0u8; 16]);
        assert_eq!(cipher.len(), 24);
        assert_eq!(decrypt(b"key", &cipher).unwrap(), vec![0u8; 16]);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let cipher = encrypt(b"key", b"");
        assert_eq!(cipher.len(), 8);
        assert_eq!(decrypt(b"key", &cipher).unwrap(), b"");
    }

    #[test]
    fn chaining_vector_advances_per_block() {
        let key = ExpandedKey::expand(b"chain");
        let mut iv = INITIAL_IV;
        let cipher = cbc_encrypt(&key, &mut iv, &[0x42; 24]);
        assert_ne!(iv, INITIAL_IV);
        // identical plaintext blocks must not produce identical
        // ciphertext blocks under chaining
        assert_ne!(cipher[0..8], cipher[8..16]);
        assert_ne!(cipher[8..16], cipher[16..24]);

        let mut iv = INITIAL_IV;
        assert_eq!(cbc_decrypt(&key, &mut iv, &cipher).unwrap(), vec![0x42; 24]);
    }

    #[test]
    fn vector_carries_across_messages() {
        // channels encrypt one message at a time while the chaining
        // vector persists for the life of the channel
        let key = ExpandedKey::expand(b"stream");
        let mut enc_iv = INITIAL_IV;
        let c1 = cbc_encrypt(&key, &mut enc_iv, b"first message");
        let c2 = cbc_encrypt(&key, &mut enc_iv, b"second message");

        let mut dec_iv = INITIAL_IV;
        assert_eq!(cbc_decrypt(&key, &mut dec_iv, &c1).unwrap(), b"first message");
        assert_eq!(cbc_decrypt(&key, &mut dec_iv, &c2).unwrap(), b"second message");
    }

    #[test]
    fn misaligned_ciphertext_is_rejected() {
        assert_eq!(
            decrypt(b"key", &[0u8; 13]),
            Err(Error::Misaligned { len: 13 })
        );
    }

    #[test]
    fn different_keys_differ() {
        let a = encrypt(b"aaaaa", b"same plaintext");
        let b = encrypt(b"bbbbb", b"same plaintext");
        assert_ne!(a, b);
    }

    #[test]
    fn expansion_is_deterministic() {
        let a = ExpandedKey::expand(b"siege");
        let b = ExpandedKey::expand(b"siege");
        assert_eq!(a.0, b.0);
    }
}
