//! Key and attribute resolution for incoming node records.

use tracing::debug;

use crate::api::FsNode;
use crate::base64::base64url_decode;
use crate::crypto::aes::aes128_ecb_decrypt;
use crate::crypto::attr::decrypt_attr;
use crate::crypto::keys::{a32_to_block, a32_to_bytes, bytes_to_a32};
use crate::error::{MegaError, Result};
use crate::fs::node::{NodeMeta, NodeType};

/// Name given to nodes whose attributes cannot be decrypted.
pub const BAD_ATTRIBUTE: &str = "BAD ATTRIBUTE";

/// Decrypted view of a node record, ready to be merged into the tree.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub node_type: NodeType,
    pub name: String,
    pub meta: Option<NodeMeta>,
    /// Share key to remember under the node's own handle
    pub share_key: Option<String>,
}

/// Split a `k` field into the key owner and the encrypted key.
///
/// Only the first `owner:key` pair is used; further pairs after `/` are
/// ignored.
fn split_key(raw: &str) -> Result<(&str, &str)> {
    let (owner, rest) = raw
        .split_once(':')
        .ok_or_else(|| MegaError::CryptoError(format!("malformed node key: {}", raw)))?;
    let key = rest.split('/').next().unwrap_or(rest);
    Ok((owner, key))
}

fn unwrap_key(wrapped: &str, key: &[u8; 16]) -> Result<Vec<u32>> {
    let raw = base64url_decode(wrapped)?;
    Ok(bytes_to_a32(&aes128_ecb_decrypt(&raw, key)?))
}

fn first_block(words: &[u32]) -> Result<[u8; 16]> {
    match words {
        [a, b, c, d, ..] => Ok(a32_to_block([*a, *b, *c, *d])),
        _ => Err(MegaError::CryptoError("key shorter than 16 bytes".to_string())),
    }
}

/// Decrypt the key and name of `item`.
///
/// # Arguments
/// * `item` - Node record from a listing, an event or an upload completion
/// * `master_key` - Account master key
/// * `owner_share_key` - Stored share key of the key owner, if any
///
/// # Returns
/// `None` when the record must be skipped (a file whose key is too short).
pub(crate) fn resolve(
    item: &FsNode,
    master_key: &[u8; 16],
    owner_share_key: Option<&str>,
) -> Result<Option<Resolved>> {
    let node_type = NodeType::from_i64(item.node_type)
        .ok_or_else(|| MegaError::InvalidArgument(format!("unknown node type {}", item.node_type)))?;

    if !matches!(node_type, NodeType::File | NodeType::Folder) {
        return Ok(Some(Resolved {
            node_type,
            name: String::new(),
            meta: None,
            share_key: None,
        }));
    }

    let raw_key = item
        .key
        .as_deref()
        .ok_or_else(|| MegaError::CryptoError(format!("node {} has no key", item.handle)))?;
    let (owner, wrapped) = split_key(raw_key)?;

    let sharing_user = item.sharing_user.as_deref().unwrap_or("");
    let mut share_key = None;

    // Keys wrapped by the record's own owner use the master key directly.
    let compkey = if owner == item.user {
        unwrap_key(wrapped, master_key)?
    } else if !sharing_user.is_empty() {
        share_key = Some(wrapped.to_string());
        unwrap_key(wrapped, master_key)?
    } else {
        let stored = owner_share_key.ok_or_else(|| {
            MegaError::NotFound(format!("no share key for {} (node {})", owner, item.handle))
        })?;
        let folder_key = first_block(&unwrap_key(stored, master_key)?)?;
        unwrap_key(wrapped, &folder_key)?
    };

    let meta = match node_type {
        NodeType::File => {
            if compkey.len() < 8 {
                debug!(handle = %item.handle, words = compkey.len(), "skipping file with short key");
                return Ok(None);
            }
            let c = &compkey;
            let mut mac = [0u8; 8];
            mac.copy_from_slice(&a32_to_bytes(&[c[6], c[7]]));
            NodeMeta {
                key: a32_to_block([c[0] ^ c[4], c[1] ^ c[5], c[2] ^ c[6], c[3] ^ c[7]]),
                iv: a32_to_block([c[4], c[5], 0, 0]),
                mac,
                compkey: a32_to_bytes(c),
            }
        }
        _ => NodeMeta {
            key: first_block(&compkey)?,
            compkey: a32_to_bytes(&compkey),
            ..Default::default()
        },
    };

    let name = match decrypt_attr(&meta.key, &item.attr) {
        Ok(attr) => attr.name,
        Err(e) => {
            debug!(handle = %item.handle, error = %e, "attribute decryption failed");
            BAD_ATTRIBUTE.to_string()
        }
    };

    Ok(Some(Resolved {
        node_type,
        name,
        meta: Some(meta),
        share_key,
    }))
}
