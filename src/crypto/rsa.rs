//! RSA session-id decryption.
//!
//! At login the server sends the session id encrypted to the account's RSA
//! key. The private key blob is stored AES-ECB encrypted under the master key
//! as a sequence of MPIs.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::base64::{base64url_decode, base64url_encode};
use crate::crypto::aes::aes128_ecb_decrypt;
use crate::error::{MegaError, Result};

/// Number of plaintext bytes that make up a session id.
const SESSION_ID_LEN: usize = 43;

/// The private key parts needed to decrypt a session id.
#[derive(Debug, Clone)]
pub struct RsaPrivateKey {
    /// Prime factor p
    pub p: BigUint,
    /// Prime factor q
    pub q: BigUint,
    /// Private exponent d
    pub d: BigUint,
}

impl RsaPrivateKey {
    /// Parse the first three MPIs (p, q, d) of a decrypted private key blob.
    ///
    /// Anything after `d` (the CRT coefficient, padding) is ignored.
    pub fn from_mpi_bytes(data: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let p = read_mpi(data, &mut pos).map_err(MegaError::CryptoError)?;
        let q = read_mpi(data, &mut pos).map_err(MegaError::CryptoError)?;
        let d = read_mpi(data, &mut pos).map_err(MegaError::CryptoError)?;
        Ok(Self { p, q, d })
    }

    /// Raw RSA decryption: `m^d mod (p*q)`.
    pub fn decrypt(&self, m: &BigUint) -> Result<Vec<u8>> {
        let n = &self.p * &self.q;
        if n.is_zero() {
            return Err(MegaError::CryptoError("RSA modulus is zero".to_string()));
        }
        let r = m.modpow(&self.d, &n);

        let mut bytes = r.to_bytes_be();
        if bytes.first() == Some(&0) {
            bytes.remove(0);
        }
        Ok(bytes)
    }
}

/// Read an MPI (2-byte big-endian bit length, then the magnitude bytes).
///
/// Advances `pos` past the integer.
pub fn read_mpi(data: &[u8], pos: &mut usize) -> std::result::Result<BigUint, String> {
    if *pos + 2 > data.len() {
        return Err("MPI truncated".to_string());
    }

    let bit_len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
    let byte_len = (bit_len + 7) / 8;
    *pos += 2;

    if *pos + byte_len > data.len() {
        return Err("MPI data truncated".to_string());
    }

    let bytes = &data[*pos..*pos + byte_len];
    *pos += byte_len;

    Ok(BigUint::from_bytes_be(bytes))
}

/// Encode an integer as an MPI.
#[cfg(test)]
pub(crate) fn append_mpi(out: &mut Vec<u8>, value: &BigUint) {
    let bits = value.bits() as u16;
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(&value.to_bytes_be());
}

/// Decrypt the login session id.
///
/// # Arguments
/// * `privk_b64` - Private key blob, AES-ECB encrypted with the master key
/// * `csid_b64` - Session id ciphertext (one MPI)
/// * `master_key` - The account master key
///
/// # Returns
/// The first 43 bytes of the RSA plaintext, base64url encoded.
pub fn decrypt_session_id(privk_b64: &str, csid_b64: &str, master_key: &[u8; 16]) -> Result<String> {
    let encrypted = base64url_decode(privk_b64)?;
    let decrypted = aes128_ecb_decrypt(&encrypted, master_key)?;
    let key = RsaPrivateKey::from_mpi_bytes(&decrypted)?;

    let csid = base64url_decode(csid_b64)?;
    let mut pos = 0;
    let m = read_mpi(&csid, &mut pos).map_err(MegaError::CryptoError)?;

    let plaintext = key.decrypt(&m)?;
    if plaintext.len() < SESSION_ID_LEN {
        return Err(MegaError::CryptoError("Session ID too short".to_string()));
    }

    Ok(base64url_encode(&plaintext[..SESSION_ID_LEN]))
}
