//! MEGA-specific key derivation and word-array helpers.
//!
//! These are proprietary algorithms used by MEGA, NOT industry-standard KDFs.
//! Do not use these for other purposes.

use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha512;

use super::aes::aes128_ecb_encrypt_block;
use crate::base64::base64url_encode;
use crate::error::{MegaError, Result};

/// Initial value of the legacy password key derivation.
const PASSWORD_KEY_SEED: [u32; 4] = [0x93C4_67E3, 0x7DB0_C7A4, 0xD1BE_3F81, 0x0152_CB56];

/// PBKDF2 iteration count for v2 accounts.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Right-pad `data` with zero bytes to the next multiple of `block`.
pub fn paddnull(data: &[u8], block: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    let rem = out.len() % block;
    if rem != 0 {
        out.resize(out.len() + block - rem, 0);
    }
    out
}

/// Pack bytes into big-endian 32-bit words.
///
/// A trailing partial word is zero-extended, as if the input had been
/// passed through [`paddnull`] first.
pub fn bytes_to_a32(data: &[u8]) -> Vec<u32> {
    data.chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

/// Unpack big-endian 32-bit words into bytes.
pub fn a32_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Pack four words into a 16-byte AES block.
pub fn a32_to_block(words: [u32; 4]) -> [u8; 16] {
    let mut block = [0u8; 16];
    for (i, w) in words.iter().enumerate() {
        block[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
    }
    block
}

/// Split a 16-byte block into four words.
pub fn block_to_a32(block: &[u8; 16]) -> [u32; 4] {
    let mut words = [0u32; 4];
    for (i, w) in words.iter_mut().enumerate() {
        let mut b = [0u8; 4];
        b.copy_from_slice(&block[i * 4..i * 4 + 4]);
        *w = u32::from_be_bytes(b);
    }
    words
}

/// Legacy (v1) password key derivation.
///
/// # Algorithm
/// 1. Pack the UTF-8 password into 4-word AES keys (the last one zero-padded)
/// 2. Starting from a fixed 16-byte seed, run 65,536 rounds; each round
///    encrypts the running value once with every password key in order
/// 3. Return the final 16-byte value
///
/// An empty password yields the seed unchanged.
pub fn password_key(password: &str) -> [u8; 16] {
    let keys: Vec<[u8; 16]> = paddnull(password.as_bytes(), 16)
        .chunks(16)
        .map(|chunk| {
            let mut key = [0u8; 16];
            key.copy_from_slice(chunk);
            key
        })
        .collect();

    let mut pkey = a32_to_block(PASSWORD_KEY_SEED);
    if keys.is_empty() {
        return pkey;
    }

    for _ in 0..65536 {
        for key in &keys {
            pkey = aes128_ecb_encrypt_block(&pkey, key);
        }
    }

    pkey
}

/// Derive `(pass_key, auth_key)` for v2 accounts.
///
/// PBKDF2-HMAC-SHA512 with 100,000 iterations and the account salt; the
/// 32-byte output is split in half.
///
/// # Errors
/// Returns [`MegaError::CryptoError`] if PBKDF2 fails.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<([u8; 16], [u8; 16])> {
    let mut derived = [0u8; 32];
    pbkdf2::<Hmac<Sha512>>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut derived)
        .map_err(|_| MegaError::CryptoError("PBKDF2 failed".to_string()))?;

    let mut pass_key = [0u8; 16];
    let mut auth_key = [0u8; 16];
    pass_key.copy_from_slice(&derived[..16]);
    auth_key.copy_from_slice(&derived[16..]);
    Ok((pass_key, auth_key))
}

/// MEGA's string hash, used as the v1 login user handle.
///
/// The string's words are XOR-folded into one 4-word block, which is then
/// encrypted 16,384 times with `key`. Words 0 and 2 of the result are
/// returned as 11 characters of base64url.
pub fn string_hash(s: &str, key: &[u8; 16]) -> String {
    let mut folded = [0u32; 4];
    for (i, word) in bytes_to_a32(s.as_bytes()).into_iter().enumerate() {
        folded[i & 3] ^= word;
    }

    let mut hash = a32_to_block(folded);
    for _ in 0..16384 {
        hash = aes128_ecb_encrypt_block(&hash, key);
    }

    let words = block_to_a32(&hash);
    base64url_encode(&a32_to_bytes(&[words[0], words[2]]))
}
