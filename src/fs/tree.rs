//! In-memory mirror of the account's node tree.
//!
//! Nodes live in a single map keyed by handle; parent and child links are
//! handles into that map. All structural changes happen under one lock, and
//! readers get cloned snapshots.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::api::FsNode;
use crate::crypto::attr::decrypt_attr;
use crate::error::{MegaError, Result};
use crate::fs::node::{Node, NodeType};
use crate::fs::resolver::{resolve, BAD_ATTRIBUTE};

#[derive(Debug, Default)]
struct FsState {
    root: Option<String>,
    trash: Option<String>,
    inbox: Option<String>,
    sroots: Vec<String>,
    lookup: HashMap<String, Node>,
    skmap: HashMap<String, String>,
}

impl FsState {
    fn detach(&mut self, handle: &str) {
        let parent = self.lookup.get(handle).and_then(|n| n.parent.clone());
        if let Some(parent) = parent.and_then(|p| self.lookup.get_mut(&p)) {
            parent.remove_child(handle);
        }
    }

    fn remove_subtree(&mut self, handle: &str) {
        let mut stack = vec![handle.to_string()];
        while let Some(h) = stack.pop() {
            if let Some(node) = self.lookup.remove(&h) {
                stack.extend(node.children);
            }
            for slot in [&mut self.root, &mut self.trash, &mut self.inbox] {
                if slot.as_deref() == Some(h.as_str()) {
                    *slot = None;
                }
            }
            self.sroots.retain(|s| *s != h);
        }
    }
}

/// The decrypted filesystem tree.
#[derive(Debug, Default)]
pub struct MegaFs {
    state: Mutex<FsState>,
}

impl MegaFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloud Drive root.
    pub async fn root(&self) -> Option<Node> {
        let st = self.state.lock().await;
        st.root.as_ref().and_then(|h| st.lookup.get(h)).cloned()
    }

    pub async fn trash(&self) -> Option<Node> {
        let st = self.state.lock().await;
        st.trash.as_ref().and_then(|h| st.lookup.get(h)).cloned()
    }

    pub async fn inbox(&self) -> Option<Node> {
        let st = self.state.lock().await;
        st.inbox.as_ref().and_then(|h| st.lookup.get(h)).cloned()
    }

    /// Roots of folders shared with this account.
    pub async fn shared_roots(&self) -> Vec<Node> {
        let st = self.state.lock().await;
        st.sroots
            .iter()
            .filter_map(|h| st.lookup.get(h))
            .cloned()
            .collect()
    }

    /// Look up a node by handle.
    pub async fn hash_lookup(&self, handle: &str) -> Option<Node> {
        self.state.lock().await.lookup.get(handle).cloned()
    }

    /// Current children of `node`.
    ///
    /// The node is re-read from the tree, so a stale snapshot still returns
    /// up-to-date children.
    pub async fn children(&self, node: &Node) -> Result<Vec<Node>> {
        let st = self.state.lock().await;
        let current = st
            .lookup
            .get(&node.handle)
            .ok_or_else(|| MegaError::NotFound(format!("node {}", node.handle)))?;
        Ok(current
            .children
            .iter()
            .filter_map(|h| st.lookup.get(h))
            .cloned()
            .collect())
    }

    /// Resolve a name path below `root`.
    ///
    /// Returns the node for each path element, in order. Names are matched
    /// exactly; with duplicate names the first child found wins.
    ///
    /// # Example
    /// ```no_run
    /// # async fn example(fs: &megafs::fs::MegaFs) -> megafs::Result<()> {
    /// let root = fs.root().await.expect("not loaded");
    /// let chain = fs.path_lookup(&root, &["Documents", "report.pdf"]).await?;
    /// println!("{}", chain.last().unwrap().handle);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn path_lookup(&self, root: &Node, names: &[&str]) -> Result<Vec<Node>> {
        let st = self.state.lock().await;
        let mut current = st
            .lookup
            .get(&root.handle)
            .ok_or_else(|| MegaError::NotFound(format!("node {}", root.handle)))?;
        let mut found = Vec::with_capacity(names.len());

        for name in names {
            let next = current
                .children
                .iter()
                .filter_map(|h| st.lookup.get(h))
                .find(|child| child.name == *name)
                .ok_or_else(|| MegaError::NotFound(format!("path element {:?}", name)))?;
            found.push(next.clone());
            current = next;
        }

        Ok(found)
    }

    /// Number of nodes in the tree.
    pub async fn len(&self) -> usize {
        self.state.lock().await.lookup.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn clear(&self) {
        *self.state.lock().await = FsState::default();
    }

    pub(crate) async fn set_share_keys(&self, keys: impl IntoIterator<Item = (String, String)>) {
        let mut st = self.state.lock().await;
        st.skmap.extend(keys);
    }

    /// Merge one node record into the tree.
    ///
    /// Ingesting the same record twice leaves the tree unchanged. A record
    /// whose parent is not known yet gets a placeholder folder as parent,
    /// filled in when the parent's own record arrives.
    ///
    /// # Returns
    /// The merged node, or `None` if the record was skipped.
    pub(crate) async fn add_fs_node(&self, item: &FsNode, master_key: &[u8; 16]) -> Result<Option<Node>> {
        let owner_share_key = match item.key.as_deref().and_then(|k| k.split_once(':')) {
            Some((owner, _)) => self.state.lock().await.skmap.get(owner).cloned(),
            None => None,
        };

        let resolved = match resolve(item, master_key, owner_share_key.as_deref())? {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        if let Some(key) = resolved.share_key {
            st.skmap.insert(item.handle.clone(), key);
        }

        st.detach(&item.handle);

        let parent = if item.parent.is_empty() {
            None
        } else {
            let parent = st
                .lookup
                .entry(item.parent.clone())
                .or_insert_with(|| Node::new(item.parent.clone(), NodeType::Folder));
            parent.add_child(&item.handle);
            Some(item.parent.clone())
        };

        let name = match resolved.node_type {
            NodeType::Root => {
                st.root = Some(item.handle.clone());
                "Cloud Drive".to_string()
            }
            NodeType::Inbox => {
                st.inbox = Some(item.handle.clone());
                "InBox".to_string()
            }
            NodeType::Trash => {
                st.trash = Some(item.handle.clone());
                "Trash".to_string()
            }
            _ => resolved.name,
        };

        if item.sharing_user.as_deref().is_some_and(|s| !s.is_empty())
            && !st.sroots.contains(&item.handle)
        {
            st.sroots.push(item.handle.clone());
        }

        let node = st
            .lookup
            .entry(item.handle.clone())
            .or_insert_with(|| Node::new(item.handle.clone(), resolved.node_type));
        node.node_type = resolved.node_type;
        node.name = name;
        node.parent = parent;
        node.size = item.size.unwrap_or(0);
        node.timestamp = item.ts;
        if let Some(meta) = resolved.meta {
            node.meta = meta;
        }

        Ok(Some(node.clone()))
    }

    /// Apply an attribute update (`u` event).
    pub(crate) async fn update_attr(&self, handle: &str, attr: Option<&str>, ts: Option<i64>) -> Result<()> {
        let mut st = self.state.lock().await;
        let node = st
            .lookup
            .get_mut(handle)
            .ok_or_else(|| MegaError::NotFound(format!("node {}", handle)))?;
        let attr = attr.ok_or_else(|| MegaError::BadAttribute("update without attributes".to_string()))?;

        node.name = match decrypt_attr(&node.meta.key, attr) {
            Ok(a) => a.name,
            Err(e) => {
                debug!(handle, error = %e, "attribute update failed to decrypt");
                BAD_ATTRIBUTE.to_string()
            }
        };
        node.timestamp = ts.unwrap_or(0);
        Ok(())
    }

    /// Detach `handle` and drop it with its descendants.
    ///
    /// Does nothing when the node or its parent is unknown.
    pub(crate) async fn remove_node(&self, handle: &str) -> bool {
        let mut st = self.state.lock().await;
        let has_parent = st
            .lookup
            .get(handle)
            .and_then(|n| n.parent.as_ref())
            .is_some_and(|p| st.lookup.contains_key(p));
        if !has_parent {
            return false;
        }
        st.detach(handle);
        st.remove_subtree(handle);
        true
    }

    /// Drop `handle` and its descendants whether or not its parent is known.
    pub(crate) async fn discard_node(&self, handle: &str) {
        let mut st = self.state.lock().await;
        st.detach(handle);
        st.remove_subtree(handle);
    }

    /// Re-parent `handle` under `new_parent`.
    pub(crate) async fn move_node(&self, handle: &str, new_parent: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.lookup.contains_key(new_parent) {
            return Err(MegaError::NotFound(format!("node {}", new_parent)));
        }
        if !st.lookup.contains_key(handle) {
            return Err(MegaError::NotFound(format!("node {}", handle)));
        }

        st.detach(handle);
        if let Some(parent) = st.lookup.get_mut(new_parent) {
            parent.add_child(handle);
        }
        if let Some(node) = st.lookup.get_mut(handle) {
            node.parent = Some(new_parent.to_string());
        }
        Ok(())
    }

    pub(crate) async fn rename(&self, handle: &str, name: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        let node = st
            .lookup
            .get_mut(handle)
            .ok_or_else(|| MegaError::NotFound(format!("node {}", handle)))?;
        node.name = name.to_string();
        Ok(())
    }
}
