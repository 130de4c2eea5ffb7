//! Filesystem node types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Node type enumeration matching MEGA's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    /// Regular file
    File = 0,
    /// Folder/directory
    Folder = 1,
    /// Root folder (Cloud Drive)
    Root = 2,
    /// Inbox folder
    Inbox = 3,
    /// Trash folder
    Trash = 4,
}

impl NodeType {
    /// Create from integer type value.
    pub fn from_i64(t: i64) -> Option<Self> {
        match t {
            0 => Some(NodeType::File),
            1 => Some(NodeType::Folder),
            2 => Some(NodeType::Root),
            3 => Some(NodeType::Inbox),
            4 => Some(NodeType::Trash),
            _ => None,
        }
    }

    /// Wire value of this type.
    pub fn as_i64(self) -> i64 {
        self as u8 as i64
    }

    /// Check if this node type is a container (can have children).
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeType::File)
    }
}

/// Key material of a node.
///
/// For files `key` is the content key folded out of the 8-word compound key,
/// `iv` the CTR nonce (words 4 and 5 of the compound key) and `mac` the
/// expected whole-file MAC (words 6 and 7). Folders only carry `key`, which
/// equals `compkey`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub key: [u8; 16],
    pub iv: [u8; 16],
    pub mac: [u8; 8],
    pub compkey: Vec<u8>,
}

/// A node in the MEGA filesystem.
///
/// Parent and children are stored as handles into the tree's lookup table.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node handle (unique identifier)
    pub handle: String,
    /// Node name (decrypted)
    pub name: String,
    /// Node type
    pub node_type: NodeType,
    /// File size in bytes (0 for folders)
    pub size: u64,
    /// Timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// Parent node handle
    pub parent: Option<String>,
    /// Child node handles
    pub children: Vec<String>,
    pub(crate) meta: NodeMeta,
}

impl Node {
    pub(crate) fn new(handle: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            handle: handle.into(),
            name: String::new(),
            node_type,
            size: 0,
            timestamp: 0,
            parent: None,
            children: Vec::new(),
            meta: NodeMeta::default(),
        }
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    /// Check if this node is a folder (any container type).
    pub fn is_folder(&self) -> bool {
        self.node_type.is_container()
    }

    /// Key material of this node.
    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub(crate) fn add_child(&mut self, handle: &str) {
        if !self.children.iter().any(|c| c == handle) {
            self.children.push(handle.to_string());
        }
    }

    pub(crate) fn remove_child(&mut self, handle: &str) {
        self.children.retain(|c| c != handle);
    }
}

/// User storage quota information.
#[derive(Debug, Clone, Default)]
pub struct Quota {
    /// Total storage in bytes
    pub total: u64,
    /// Used storage in bytes
    pub used: u64,
    /// Per-root usage as reported by the server, keyed by node handle
    pub per_node: HashMap<String, Vec<i64>>,
}

impl Quota {
    /// Get free storage in bytes.
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }

    /// Get usage percentage.
    pub fn usage_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.used as f64 / self.total as f64) * 100.0
        }
    }
}
