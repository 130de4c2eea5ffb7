//! AES-128 encryption operations.
//!
//! MEGA uses AES-128 in multiple modes:
//! - ECB: key wrapping and the legacy password key derivation
//! - CBC (zero IV): node attribute blobs, and as a MAC over file contents
//! - CTR: file content encryption

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{MegaError, Result};

fn check_block_len(data: &[u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(MegaError::CryptoError(format!(
            "Data length must be multiple of 16, got {}",
            data.len()
        )));
    }
    Ok(())
}

/// AES-128-ECB encrypt a single 16-byte block.
///
/// # Arguments
/// * `data` - 16-byte block to encrypt
/// * `key` - 16-byte AES key
///
/// # Returns
/// Encrypted 16-byte block
pub fn aes128_ecb_encrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.encrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB decrypt a single 16-byte block.
pub fn aes128_ecb_decrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.decrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB encrypt multiple blocks.
///
/// # Arguments
/// * `data` - Data to encrypt (length must be multiple of 16)
/// * `key` - 16-byte AES key
///
/// # Errors
/// Returns [`MegaError::CryptoError`] if the length is not a multiple of 16.
pub fn aes128_ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    check_block_len(data)?;

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = data.to_vec();

    for chunk in result.chunks_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }

    Ok(result)
}

/// AES-128-ECB decrypt multiple blocks.
///
/// # Errors
/// Returns [`MegaError::CryptoError`] if the length is not a multiple of 16.
pub fn aes128_ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    check_block_len(data)?;

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = data.to_vec();

    for chunk in result.chunks_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }

    Ok(result)
}

/// AES-128-CBC encrypt multiple blocks with zero IV.
pub fn aes128_cbc_encrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    check_block_len(data)?;

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = Vec::with_capacity(data.len());
    let mut iv = [0u8; 16];

    for chunk in data.chunks(16) {
        let mut block = GenericArray::clone_from_slice(chunk);

        // XOR with previous ciphertext block (or IV for first block)
        for i in 0..16 {
            block[i] ^= iv[i];
        }

        cipher.encrypt_block(&mut block);
        result.extend_from_slice(&block);
        iv.copy_from_slice(&block);
    }

    Ok(result)
}

/// AES-128-CBC decrypt multiple blocks with zero IV.
pub fn aes128_cbc_decrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    check_block_len(data)?;

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut result = Vec::with_capacity(data.len());
    let mut iv = [0u8; 16];

    for chunk in data.chunks(16) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);

        for i in 0..16 {
            block[i] ^= iv[i];
        }

        result.extend_from_slice(&block);
        iv.copy_from_slice(chunk);
    }

    Ok(result)
}

/// AES-128-CTR keystream XOR.
///
/// The 16-byte `iv` is the initial counter block; it is incremented as a
/// 128-bit big-endian integer for every block. Encryption and decryption are
/// the same operation.
pub fn aes128_ctr(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut counter = u128::from_be_bytes(*iv);
    let mut result = Vec::with_capacity(data.len());

    for chunk in data.chunks(16) {
        let mut keystream = GenericArray::from(counter.to_be_bytes());
        cipher.encrypt_block(&mut keystream);
        result.extend(chunk.iter().zip(keystream.iter()).map(|(b, k)| b ^ k));
        counter = counter.wrapping_add(1);
    }

    result
}

/// CBC-MAC over `data`, starting from `iv`.
///
/// `data` is zero-padded to the block size first; the final ciphertext
/// block is the MAC.
pub fn aes128_cbc_mac(data: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut mac = *iv;

    for chunk in data.chunks(16) {
        for (m, b) in mac.iter_mut().zip(chunk) {
            *m ^= b;
        }
        let mut block = GenericArray::from(mac);
        cipher.encrypt_block(&mut block);
        mac = block.into();
    }

    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_block() {
        let key = [0u8; 16];
        let plaintext = [1u8; 16];

        let ciphertext = aes128_ecb_encrypt_block(&plaintext, &key);
        let decrypted = aes128_ecb_decrypt_block(&ciphertext, &key);

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ecb_multiple_blocks_are_inverse() {
        let key = [0x42u8; 16];
        let plaintext: Vec<u8> = (0..32u8).map(|i| i.wrapping_mul(3)).collect();

        let ciphertext = aes128_ecb_encrypt(&plaintext, &key).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = aes128_ecb_decrypt(&ciphertext, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ecb_rejects_partial_blocks() {
        let key = [0u8; 16];
        assert!(aes128_ecb_encrypt(&[0u8; 15], &key).is_err());
        assert!(aes128_ecb_decrypt(&[0u8; 17], &key).is_err());
        assert!(aes128_cbc_encrypt(&[0u8; 1], &key).is_err());
        assert!(aes128_cbc_decrypt(&[0u8; 31], &key).is_err());
    }

    #[test]
    fn test_known_vector() {
        // FIPS-197 appendix C.1
        let key: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let plaintext: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let expected: [u8; 16] = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a,
        ];

        assert_eq!(aes128_ecb_encrypt_block(&plaintext, &key), expected);
    }

    #[test]
    fn test_cbc_matches_manual_chaining() {
        let key = [0u8; 16];
        let p1 = [1u8; 16];
        let p2 = [2u8; 16];

        // C1 = E(P1), C2 = E(P2 ^ C1)
        let c1 = aes128_ecb_encrypt_block(&p1, &key);
        let mut p2_xor_c1 = [0u8; 16];
        for i in 0..16 {
            p2_xor_c1[i] = p2[i] ^ c1[i];
        }
        let c2 = aes128_ecb_encrypt_block(&p2_xor_c1, &key);

        let mut plaintext = p1.to_vec();
        plaintext.extend_from_slice(&p2);
        let ciphertext = aes128_cbc_encrypt(&plaintext, &key).unwrap();
        assert_eq!(ciphertext[..16], c1);
        assert_eq!(ciphertext[16..], c2);

        let decrypted = aes128_cbc_decrypt(&ciphertext, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_cbc_mac_is_last_cbc_block() {
        let key = [0x12u8; 16];
        let data = vec![0xABu8; 48];

        let ciphertext = aes128_cbc_encrypt(&data, &key).unwrap();
        let mac = aes128_cbc_mac(&data, &key, &[0u8; 16]);

        assert_eq!(mac[..], ciphertext[32..]);
    }

    #[test]
    fn test_cbc_mac_pads_with_zeros() {
        let key = [0x34u8; 16];
        let iv = [7u8; 16];
        let short = [9u8; 20];
        let mut padded = short.to_vec();
        padded.resize(32, 0);

        assert_eq!(
            aes128_cbc_mac(&short, &key, &iv),
            aes128_cbc_mac(&padded, &key, &iv)
        );
    }

    #[test]
    fn test_ctr_is_symmetric() {
        let key = [0x55u8; 16];
        let iv = [0xffu8; 16]; // counter wraps on the second block
        let data: Vec<u8> = (0..40u8).collect();

        let encrypted = aes128_ctr(&data, &key, &iv);
        assert_eq!(encrypted.len(), data.len());
        assert_ne!(encrypted, data);
        assert_eq!(aes128_ctr(&encrypted, &key, &iv), data);
    }

    #[test]
    fn test_ctr_first_block_is_ecb_of_counter() {
        let key = [0x01u8; 16];
        let iv = [0x10u8; 16];
        let keystream = aes128_ecb_encrypt_block(&iv, &key);

        assert_eq!(aes128_ctr(&[0u8; 16], &key, &iv), keystream.to_vec());
    }
}
