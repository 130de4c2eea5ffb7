//! Upload engine.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::api::{ApiClient, FsNode, PutNodesResponse};
use crate::base64::base64url_encode;
use crate::crypto::aes::{aes128_cbc_mac, aes128_ctr, aes128_ecb_encrypt};
use crate::crypto::attr::{encrypt_attr, FileAttr};
use crate::crypto::keys::{a32_to_block, a32_to_bytes, bytes_to_a32};
use crate::crypto::random::{make_random_words, rand_string};
use crate::error::{MegaError, Result};
use crate::fs::NodeType;
use crate::transfer::chunk::{chunk_mac_iv, ctr_iv, get_chunk_sizes, ChunkSize};
use crate::transfer::{condense_mac, with_retries};

#[derive(Default)]
struct UploadState {
    chunk_macs: Vec<Option<[u8; 16]>>,
    completion_handle: Vec<u8>,
}

/// State of one file upload.
///
/// The random 6-word upload key supplies the content key (words 0-3) and
/// the CTR nonce (words 4-5). An empty file is sent as one empty chunk so
/// the server still hands out a completion handle.
pub struct Upload {
    api: Arc<ApiClient>,
    master_key: [u8; 16],
    parent: String,
    name: String,
    url: String,
    ukey: [u32; 6],
    key: [u8; 16],
    nonce: [u8; 16],
    chunks: Vec<ChunkSize>,
    state: Mutex<UploadState>,
}

impl Upload {
    pub(crate) fn new(
        api: Arc<ApiClient>,
        master_key: [u8; 16],
        parent: String,
        name: String,
        url: String,
        size: u64,
    ) -> Self {
        Self::with_key(api, master_key, parent, name, url, size, make_random_words())
    }

    pub(crate) fn with_key(
        api: Arc<ApiClient>,
        master_key: [u8; 16],
        parent: String,
        name: String,
        url: String,
        size: u64,
        ukey: [u32; 6],
    ) -> Self {
        let mut chunks = get_chunk_sizes(size);
        if chunks.is_empty() {
            chunks.push(ChunkSize::new(0, 0));
        }
        let state = UploadState {
            chunk_macs: vec![None; chunks.len()],
            completion_handle: Vec::new(),
        };

        Self {
            api,
            master_key,
            parent,
            name,
            url,
            key: a32_to_block([ukey[0], ukey[1], ukey[2], ukey[3]]),
            nonce: a32_to_block([ukey[4], ukey[5], 0, 0]),
            ukey,
            chunks,
            state: Mutex::new(state),
        }
    }

    /// Number of chunks in the upload.
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

    /// Encrypt and send chunk `id`.
    ///
    /// `data` must be exactly the chunk's size. A non-empty response body
    /// is kept as the completion handle.
    pub async fn upload_chunk(&self, id: usize, data: &[u8]) -> Result<()> {
        let chunk = self.chunk_location(id)?;
        if data.len() != chunk.size {
            return Err(MegaError::InvalidArgument(format!(
                "upload chunk is wrong size: {} != {}",
                data.len(),
                chunk.size
            )));
        }

        let mac = aes128_cbc_mac(data, &self.key, &chunk_mac_iv(&self.nonce));
        let encrypted = aes128_ctr(data, &self.key, &ctr_iv(&self.nonce, chunk.position));
        let url = format!("{}/{}", self.url, chunk.position);

        let transport = self.api.transport();
        let response = with_retries(self.api.config(), "upload chunk", || {
            transport.post(&url, encrypted.clone())
        })
        .await?;

        let mut st = self.state.lock().await;
        if !response.body.is_empty() {
            st.completion_handle = response.body;
        }
        st.chunk_macs[id] = Some(mac);
        Ok(())
    }

    /// Commit the uploaded content as a new file node.
    ///
    /// # Returns
    /// The node record created by the server.
    pub async fn finish(&self) -> Result<FsNode> {
        let (macs, handle) = {
            let st = self.state.lock().await;
            let macs = st
                .chunk_macs
                .iter()
                .enumerate()
                .map(|(i, m)| m.ok_or_else(|| MegaError::InvalidState(format!("chunk {} not uploaded", i))))
                .collect::<Result<Vec<_>>>()?;
            let handle = String::from_utf8(st.completion_handle.clone()).map_err(|_| MegaError::InvalidResponse)?;
            (macs, handle)
        };
        if handle.is_empty() {
            return Err(MegaError::InvalidState("no completion handle received".to_string()));
        }

        let mac = bytes_to_a32(&condense_mac(&macs, &self.key));
        let u = &self.ukey;
        let compkey = [
            u[0] ^ u[4],
            u[1] ^ u[5],
            u[2] ^ mac[0],
            u[3] ^ mac[1],
            u[4],
            u[5],
            mac[0],
            mac[1],
        ];
        let wrapped = aes128_ecb_encrypt(&a32_to_bytes(&compkey), &self.master_key)?;
        let attr = encrypt_attr(&self.key, &FileAttr::new(self.name.clone()))?;

        let resp: PutNodesResponse = self
            .api
            .request_one(json!({
                "a": "p",
                "t": self.parent,
                "n": [{
                    "h": handle,
                    "t": NodeType::File.as_i64(),
                    "a": attr,
                    "k": base64url_encode(&wrapped),
                }],
                "i": rand_string(10),
            }))
            .await?;

        resp.f.into_iter().next().ok_or(MegaError::InvalidResponse)
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("parent", &self.parent)
            .field("name", &self.name)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base64::base64url_decode;
    use crate::config::ClientConfig;
    use crate::crypto::aes::aes128_ecb_decrypt;
    use crate::crypto::attr::decrypt_attr;
    use crate::http::HttpResponse;
    use crate::testutil::FakeTransport;

    const MK: [u8; 16] = [0x42; 16];
    const UKEY: [u32; 6] = [1, 2, 3, 4, 5, 6];

    fn upload(transport: Arc<FakeTransport>, size: u64) -> Upload {
        let api = Arc::new(ApiClient::new(
            ClientConfig::default().with_base_url("https://api.test"),
            transport,
        ));
        Upload::with_key(api, MK, "root0001".into(), "hello.txt".into(), "https://ul.test/u".into(), size, UKEY)
    }

    fn accept_put(transport: &FakeTransport) {
        transport.set_handler(|req| {
            if req.url.starts_with("https://api.test/cs") {
                let cmd = &req.json()[0];
                let node = json!([{ "f": [{
                    "h": "newf0001", "p": cmd["t"], "u": "me", "t": 0,
                    "a": cmd["n"][0]["a"], "k": format!("me:{}", cmd["n"][0]["k"].as_str().unwrap()),
                    "s": 5, "ts": 1
                }]}]);
                return Some(Ok(HttpResponse::new(200, node.to_string())));
            }
            None
        });
    }

    #[tokio::test]
    async fn test_upload_and_finish() {
        let transport = FakeTransport::new();
        transport.push(200, "HANDLE01");
        accept_put(&transport);

        let up = upload(transport.clone(), 5);
        assert_eq!(up.chunks(), 1);
        up.upload_chunk(0, b"hello").await.unwrap();
        let node = up.finish().await.unwrap();
        assert_eq!(node.handle, "newf0001");

        let requests = transport.requests();
        assert_eq!(requests[0].url, "https://ul.test/u/0");
        let key = a32_to_block([1, 2, 3, 4]);
        let nonce = a32_to_block([5, 6, 0, 0]);
        assert_eq!(aes128_ctr(&requests[0].body, &key, &nonce), b"hello");

        let cmd = &requests[1].json()[0];
        assert_eq!(cmd["a"], "p");
        assert_eq!(cmd["t"], "root0001");
        assert_eq!(cmd["n"][0]["h"], "HANDLE01");
        assert_eq!(cmd["n"][0]["t"], 0);
        assert_eq!(cmd["i"].as_str().unwrap().len(), 10);
        assert_eq!(decrypt_attr(&key, cmd["n"][0]["a"].as_str().unwrap()).unwrap().name, "hello.txt");

        let wrapped = base64url_decode(cmd["n"][0]["k"].as_str().unwrap()).unwrap();
        let c = bytes_to_a32(&aes128_ecb_decrypt(&wrapped, &MK).unwrap());
        assert_eq!(&c[..2], &[1 ^ 5, 2 ^ 6]);
        assert_eq!(&c[4..6], &[5, 6]);
        assert_eq!([c[0] ^ c[4], c[1] ^ c[5], c[2] ^ c[6], c[3] ^ c[7]], [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_file_uses_single_empty_chunk() {
        let transport = FakeTransport::new();
        transport.push(200, "EMPTYHND");
        accept_put(&transport);

        let up = upload(transport.clone(), 0);
        assert_eq!(up.chunks(), 1);
        assert_eq!(up.chunk_location(0).unwrap(), ChunkSize::new(0, 0));
        up.upload_chunk(0, &[]).await.unwrap();
        up.finish().await.unwrap();
        assert!(transport.requests()[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_size_and_missing_chunks() {
        let transport = FakeTransport::new();
        let up = upload(transport.clone(), 300_000);
        assert_eq!(up.chunks(), 2);

        let err = up.upload_chunk(0, &[0u8; 10]).await.unwrap_err();
        assert!(matches!(err, MegaError::InvalidArgument(_)));
        assert!(transport.requests().is_empty());

        assert!(matches!(up.finish().await, Err(MegaError::InvalidState(_))));
    }
}
