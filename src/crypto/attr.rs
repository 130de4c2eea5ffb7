//! Node attribute blobs.
//!
//! Attributes are stored as `MEGA{json}`, zero-padded to the AES block size,
//! AES-128-CBC encrypted with a zero IV under the node key and base64url
//! encoded.

use serde::{Deserialize, Serialize};

use crate::base64::{base64url_decode, base64url_encode};
use crate::crypto::aes::{aes128_cbc_decrypt, aes128_cbc_encrypt};
use crate::crypto::keys::paddnull;
use crate::error::{MegaError, Result};

const ATTR_PREFIX: &[u8; 4] = b"MEGA";

/// Decrypted node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Node name
    #[serde(rename = "n")]
    pub name: String,
}

impl FileAttr {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Encrypt attributes under `key`.
///
/// # Example
/// ```
/// use megafs::crypto::{decrypt_attr, encrypt_attr, FileAttr};
///
/// # fn example() -> megafs::Result<()> {
/// let key = [7u8; 16];
/// let blob = encrypt_attr(&key, &FileAttr::new("notes.txt"))?;
/// assert_eq!(decrypt_attr(&key, &blob)?.name, "notes.txt");
/// # Ok(())
/// # }
/// ```
pub fn encrypt_attr(key: &[u8; 16], attr: &FileAttr) -> Result<String> {
    let mut plain = ATTR_PREFIX.to_vec();
    plain.extend_from_slice(serde_json::to_string(attr)?.as_bytes());

    let encrypted = aes128_cbc_encrypt(&paddnull(&plain, 16), key)?;
    Ok(base64url_encode(&encrypted))
}

/// Decrypt an attribute blob.
///
/// Trailing bytes after the JSON object (padding, junk from other clients)
/// are ignored.
///
/// # Errors
/// Returns [`MegaError::BadAttribute`] if the blob does not decrypt to the
/// `MEGA` prefix or the JSON cannot be parsed.
pub fn decrypt_attr(key: &[u8; 16], data: &str) -> Result<FileAttr> {
    let raw = base64url_decode(data)?;
    let plain = aes128_cbc_decrypt(&raw, key)
        .map_err(|e| MegaError::BadAttribute(format!("decryption failed: {}", e)))?;

    if plain.len() < ATTR_PREFIX.len() || &plain[..4] != ATTR_PREFIX {
        return Err(MegaError::BadAttribute("MEGA prefix not found".to_string()));
    }

    let body = &plain[4..];
    let json = extract_json_object(body).unwrap_or(body);
    serde_json::from_slice(json)
        .map_err(|e| MegaError::BadAttribute(format!("failed to parse attributes: {}", e)))
}

/// First balanced `{...}` in `data`, honouring JSON string escapes.
fn extract_json_object(data: &[u8]) -> Option<&[u8]> {
    let start = data.iter().position(|&b| b == b'{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in data.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&data[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
