//! Wire shapes of API responses and filesystem events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node record as sent in `f` listings, upload completions and `t` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsNode {
    #[serde(rename = "h")]
    pub handle: String,
    #[serde(rename = "p", default)]
    pub parent: String,
    #[serde(rename = "u", default)]
    pub user: String,
    #[serde(rename = "t")]
    pub node_type: i64,
    #[serde(rename = "a", default)]
    pub attr: String,
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub ts: i64,
    /// Sharing user; present on incoming share roots
    #[serde(rename = "su", default, skip_serializing_if = "Option::is_none")]
    pub sharing_user: Option<String>,
}

/// Entry of the `ok` share-key list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareKey {
    #[serde(rename = "h")]
    pub handle: String,
    #[serde(rename = "k")]
    pub key: String,
}

/// Response to the `f` (fetch nodes) command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesResponse {
    #[serde(default)]
    pub f: Vec<FsNode>,
    #[serde(default)]
    pub ok: Vec<ShareKey>,
    #[serde(default)]
    pub sn: String,
}

/// Response to `us0`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreloginResponse {
    #[serde(default)]
    pub v: i64,
    #[serde(default)]
    pub s: Option<String>,
}

/// Response to `us`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    pub k: String,
    pub csid: String,
    pub privk: String,
    #[serde(default)]
    pub u: Option<String>,
}

/// Response to `uq`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaResponse {
    #[serde(default)]
    pub mstrg: u64,
    #[serde(default)]
    pub cstrg: u64,
    #[serde(default)]
    pub cstrgn: HashMap<String, Vec<i64>>,
}

/// Response to `g` (download URL).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadResponse {
    #[serde(default)]
    pub g: String,
    #[serde(default)]
    pub s: u64,
    #[serde(default)]
    pub at: String,
    #[serde(default)]
    pub e: Option<i64>,
}

/// Response to `u` (upload URL).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    pub p: String,
}

/// Response to `p` (put nodes).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PutNodesResponse {
    #[serde(default)]
    pub f: Vec<FsNode>,
}

/// One long-poll batch from the event channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Events {
    /// Wait URL; when set the batch carries no events
    #[serde(default)]
    pub w: Option<String>,
    #[serde(default)]
    pub sn: Option<String>,
    #[serde(default)]
    pub a: Vec<Value>,
}

/// Node list carried by a `t` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventTree {
    #[serde(default)]
    pub f: Vec<FsNode>,
}

/// A filesystem event (`t`, `u` or `d`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FsEvent {
    pub a: String,
    #[serde(default)]
    pub t: Option<EventTree>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
}
