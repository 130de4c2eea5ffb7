//! Download engine.
//!
//! Chunks can be fetched in any order and concurrently; each one is
//! decrypted with AES-CTR at its own offset and MACed on its own. The
//! per-chunk MACs are chained in `finish` and compared with the MAC stored
//! in the node key.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::crypto::aes::{aes128_cbc_mac, aes128_ctr};
use crate::error::{MegaError, Result};
use crate::fs::NodeMeta;
use crate::http::Transport;
use crate::transfer::chunk::{chunk_mac_iv, ctr_iv, get_chunk_sizes, ChunkSize};
use crate::transfer::{condense_mac, with_retries};

/// State of one file download.
pub struct Download {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    meta: NodeMeta,
    url: String,
    chunks: Vec<ChunkSize>,
    chunk_macs: Mutex<Vec<Option<[u8; 16]>>>,
}

impl Download {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        meta: NodeMeta,
        url: String,
        size: u64,
    ) -> Self {
        let chunks = get_chunk_sizes(size);
        let chunk_macs = Mutex::new(vec![None; chunks.len()]);
        Self {
            transport,
            config,
            meta,
            url,
            chunks,
            chunk_macs,
        }
    }

    /// Number of chunks in the download.
    pub fn chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Offset and size of chunk `id`.
    pub fn chunk_location(&self, id: usize) -> Result<ChunkSize> {
        self.chunks
            .get(id)
            .copied()
            .ok_or_else(|| MegaError::InvalidArgument(format!("invalid chunk id {}", id)))
    }

    /// Fetch, decrypt and MAC chunk `id`.
    ///
    /// # Returns
    /// The plaintext of the chunk.
    pub async fn download_chunk(&self, id: usize) -> Result<Vec<u8>> {
        let chunk = self.chunk_location(id)?;
        let url = format!("{}/{}-{}", self.url, chunk.position, chunk.end() - 1);

        let response = with_retries(&self.config, "download chunk", || self.transport.get(&url)).await?;
        if response.body.len() != chunk.size {
            return Err(MegaError::InvalidResponse);
        }

        let plain = aes128_ctr(&response.body, &self.meta.key, &ctr_iv(&self.meta.iv, chunk.position));
        let mac = aes128_cbc_mac(&plain, &self.meta.key, &chunk_mac_iv(&self.meta.iv));

        self.chunk_macs.lock().await[id] = Some(mac);
        Ok(plain)
    }

    /// Verify the whole-file MAC.
    ///
    /// An empty file has nothing to verify.
    pub async fn finish(&self) -> Result<()> {
        let macs = self.chunk_macs.lock().await;
        if macs.is_empty() {
            return Ok(());
        }

        let macs = macs
            .iter()
            .enumerate()
            .map(|(i, m)| m.ok_or_else(|| MegaError::InvalidState(format!("chunk {} not downloaded", i))))
            .collect::<Result<Vec<_>>>()?;

        if condense_mac(&macs, &self.meta.key) != self.meta.mac {
            return Err(MegaError::MacMismatch);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("url", &self.url)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
