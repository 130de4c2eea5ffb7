//! The protocol client: login, tree loading, node operations and transfers.

use std::sync::{Arc, Mutex as StdMutex};

use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{
    ApiClient, DownloadResponse, ErrorCode, FilesResponse, LoginResponse, PreloginResponse, PutNodesResponse,
    QuotaResponse, UploadResponse,
};
use crate::base64::{base64url_decode, base64url_encode};
use crate::cancel::CancellationToken;
use crate::config::ClientConfig;
use crate::crypto::aes::{aes128_ecb_decrypt, aes128_ecb_encrypt};
use crate::crypto::attr::{decrypt_attr, encrypt_attr, FileAttr};
use crate::crypto::keys::{a32_to_block, derive_key, password_key, string_hash};
use crate::crypto::random::{make_random_key, make_random_words, rand_string};
use crate::crypto::rsa::decrypt_session_id;
use crate::error::{MegaError, Result};
use crate::fs::{MegaFs, Node, NodeType, Quota};
use crate::http::{HttpClient, Transport};
use crate::progress::{ProgressCallback, TransferProgress};
use crate::session::poll::{PollContext, PollTask};
use crate::transfer::{force_https, Download, Upload};

/// Login state of a [`Mega`] client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

/// MEGA client session.
///
/// Owns the API client, the decrypted filesystem tree and the background
/// event loop that keeps the tree in sync.
///
/// # Example
/// ```no_run
/// use megafs::{CancellationToken, Mega};
///
/// # async fn example() -> megafs::Result<()> {
/// let mega = Mega::new()?;
/// mega.login("user@example.com", "password", None).await?;
///
/// let root = mega.root().await.expect("tree loaded");
/// for child in mega.children(&root).await? {
///     println!("{} ({} bytes)", child.name, child.size);
/// }
///
/// let mut out = tokio::fs::File::create("notes.txt").await?;
/// let path = mega.path_lookup(&root, &["notes.txt"]).await?;
/// mega.download_file(&path[0], &mut out, &CancellationToken::new()).await?;
///
/// mega.logout().await;
/// # Ok(())
/// # }
/// ```
pub struct Mega {
    api: Arc<ApiClient>,
    fs: Arc<MegaFs>,
    master_key: RwLock<Option<[u8; 16]>>,
    ssn: Arc<Mutex<String>>,
    status: RwLock<SessionStatus>,
    poller: Mutex<Option<PollTask>>,
    progress: StdMutex<Option<ProgressCallback>>,
}

impl Mega {
    /// Create a client with default settings.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(ClientConfig::default(), Arc::new(HttpClient::new()?)))
    }

    /// Create a client that talks HTTP through reqwest.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = HttpClient::with_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(http)))
    }

    /// Create a client on top of any [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            api: Arc::new(ApiClient::new(config, transport)),
            fs: Arc::new(MegaFs::new()),
            master_key: RwLock::new(None),
            ssn: Arc::new(Mutex::new(String::new())),
            status: RwLock::new(SessionStatus::LoggedOut),
            poller: Mutex::new(None),
            progress: StdMutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    /// Install a callback invoked after every transferred chunk.
    pub fn watch_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// Remove the progress callback.
    pub fn clear_progress(&self) {
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn master_key(&self) -> Result<[u8; 16]> {
        self.master_key
            .read()
            .await
            .ok_or_else(|| MegaError::InvalidState("not logged in".to_string()))
    }

    /// Log in with email and password.
    ///
    /// Loads the filesystem tree and starts the event loop.
    ///
    /// # Arguments
    /// * `email` - Account email (case-insensitive)
    /// * `password` - Account password
    /// * `mfa` - Current two-factor code, if the account requires one
    pub async fn login(&self, email: &str, password: &str, mfa: Option<&str>) -> Result<()> {
        *self.status.write().await = SessionStatus::LoggingIn;
        let res = self.do_login(email, password, mfa).await;
        self.finish_login(res).await
    }

    async fn do_login(&self, email: &str, password: &str, mfa: Option<&str>) -> Result<()> {
        let email = email.to_lowercase();

        let pre: PreloginResponse = self
            .api
            .request_one(json!({"a": "us0", "user": email}))
            .await?;

        let (pass_key, mut cmd) = match pre.v {
            0 => return Err(MegaError::Custom("prelogin: no version returned".to_string())),
            1 => {
                let pass_key = password_key(password);
                let uh = string_hash(&email, &pass_key);
                (pass_key, json!({"a": "us", "user": email, "uh": uh}))
            }
            2 => {
                let salt = pre
                    .s
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| MegaError::Custom("prelogin: no salt returned".to_string()))?;
                let (pass_key, auth_key) = derive_key(password, &base64url_decode(&salt)?)?;
                let cmd = json!({
                    "a": "us",
                    "user": email,
                    "uh": base64url_encode(&auth_key),
                    "sek": base64url_encode(&make_random_key()),
                });
                (pass_key, cmd)
            }
            v => {
                return Err(MegaError::Custom(format!(
                    "prelogin: version {} account not supported",
                    v
                )))
            }
        };
        if let Some(mfa) = mfa {
            cmd["mfa"] = json!(mfa);
        }

        let resp: LoginResponse = self.api.request_one(cmd).await?;

        let master = aes128_ecb_decrypt(&base64url_decode(&resp.k)?, &pass_key)?;
        let master: [u8; 16] = master
            .get(..16)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| MegaError::CryptoError("master key too short".to_string()))?;
        let sid = decrypt_session_id(&resp.privk, &resp.csid, &master)?;

        *self.master_key.write().await = Some(master);
        self.api.set_session_id(sid).await;
        info!(user = resp.u.as_deref().unwrap_or(""), "logged in");

        self.load_file_system().await?;
        self.start_polling().await
    }

    /// Resume a session produced by [`Mega::dump_session`].
    pub async fn fast_login(&self, session: &str) -> Result<()> {
        *self.status.write().await = SessionStatus::LoggingIn;
        let res = async {
            let blob = base64url_decode(session)?;
            if blob.len() < 16 {
                return Err(MegaError::InvalidArgument("session blob too short".to_string()));
            }
            let mut master = [0u8; 16];
            master.copy_from_slice(&blob[..16]);
            let sid = String::from_utf8(blob[16..].to_vec())
                .map_err(|_| MegaError::InvalidArgument("session id is not UTF-8".to_string()))?;

            *self.master_key.write().await = Some(master);
            self.api.set_session_id(sid).await;

            self.load_file_system().await?;
            self.start_polling().await
        }
        .await;
        self.finish_login(res).await
    }

    async fn finish_login(&self, res: Result<()>) -> Result<()> {
        let status = if res.is_ok() {
            SessionStatus::LoggedIn
        } else {
            SessionStatus::LoggedOut
        };
        *self.status.write().await = status;
        res
    }

    /// Serialize the session (master key and session id) for
    /// [`Mega::fast_login`].
    ///
    /// Returns `None` if no master key is known.
    pub async fn dump_session(&self) -> Option<String> {
        let master = (*self.master_key.read().await)?;
        let mut blob = master.to_vec();
        blob.extend_from_slice(self.api.session_id().await.as_bytes());
        Some(base64url_encode(&blob))
    }

    /// End the session.
    ///
    /// Resets the request counters and session id and waits for the event
    /// loop to exit. The master key is kept.
    pub async fn logout(&self) {
        self.api.reset().await;
        self.ssn.lock().await.clear();
        if let Some(task) = self.poller.lock().await.take() {
            task.stop().await;
        }
        *self.status.write().await = SessionStatus::LoggedOut;
        debug!("logged out");
    }

    async fn load_file_system(&self) -> Result<()> {
        let master = self.master_key().await?;
        let resp: FilesResponse = self.api.request_one(json!({"a": "f", "c": 1})).await?;

        self.fs.clear().await;
        self.fs
            .set_share_keys(resp.ok.into_iter().map(|k| (k.handle, k.key)))
            .await;

        for item in &resp.f {
            if let Err(e) = self.fs.add_fs_node(item, &master).await {
                warn!(handle = %item.handle, error = %e, "skipping node");
            }
        }

        *self.ssn.lock().await = resp.sn;
        debug!(nodes = self.fs.len().await, "filesystem loaded");
        Ok(())
    }

    async fn start_polling(&self) -> Result<()> {
        let ctx = PollContext {
            api: self.api.clone(),
            fs: self.fs.clone(),
            master_key: self.master_key().await?,
            ssn: self.ssn.clone(),
        };
        let mut poller = self.poller.lock().await;
        if let Some(old) = poller.take() {
            old.stop().await;
        }
        *poller = Some(PollTask::spawn(ctx));
        Ok(())
    }

    /// The decrypted filesystem tree.
    pub fn file_system(&self) -> &Arc<MegaFs> {
        &self.fs
    }

    pub async fn root(&self) -> Option<Node> {
        self.fs.root().await
    }

    pub async fn trash(&self) -> Option<Node> {
        self.fs.trash().await
    }

    pub async fn inbox(&self) -> Option<Node> {
        self.fs.inbox().await
    }

    /// Look up a node by handle.
    pub async fn node(&self, handle: &str) -> Option<Node> {
        self.fs.hash_lookup(handle).await
    }

    pub async fn children(&self, node: &Node) -> Result<Vec<Node>> {
        self.fs.children(node).await
    }

    pub async fn path_lookup(&self, root: &Node, names: &[&str]) -> Result<Vec<Node>> {
        self.fs.path_lookup(root, names).await
    }

    pub async fn shared_roots(&self) -> Vec<Node> {
        self.fs.shared_roots().await
    }

    /// Fetch storage usage.
    pub async fn get_quota(&self) -> Result<Quota> {
        let resp: QuotaResponse = self
            .api
            .request_one(json!({"a": "uq", "xfer": 1, "strg": 1}))
            .await?;
        Ok(Quota {
            total: resp.mstrg,
            used: resp.cstrg,
            per_node: resp.cstrgn,
        })
    }

    /// Create a folder named `name` under `parent`.
    pub async fn create_dir(&self, name: &str, parent: &Node) -> Result<Node> {
        let master = self.master_key().await?;
        let words: [u32; 6] = make_random_words();
        let key = a32_to_block([words[0], words[1], words[2], words[3]]);

        let attr = encrypt_attr(&key, &FileAttr::new(name))?;
        let wrapped = aes128_ecb_encrypt(&key, &master)?;

        let resp: PutNodesResponse = self
            .api
            .request_one(json!({
                "a": "p",
                "t": parent.handle,
                "n": [{
                    "h": "xxxxxxxx",
                    "t": NodeType::Folder.as_i64(),
                    "a": attr,
                    "k": base64url_encode(&wrapped),
                }],
                "i": rand_string(10),
            }))
            .await?;

        let item = resp.f.first().ok_or(MegaError::InvalidResponse)?;
        self.fs
            .add_fs_node(item, &master)
            .await?
            .ok_or(MegaError::InvalidResponse)
    }

    /// Rename `node`.
    pub async fn rename(&self, node: &Node, name: &str) -> Result<()> {
        if !matches!(node.node_type, NodeType::File | NodeType::Folder) {
            return Err(MegaError::InvalidArgument(format!(
                "cannot rename {:?} node {}",
                node.node_type, node.handle
            )));
        }
        let master = self.master_key().await?;
        let meta = node.meta();

        let attr = encrypt_attr(&meta.key, &FileAttr::new(name))?;
        let key = aes128_ecb_encrypt(&meta.compkey, &master)?;

        self.api
            .request_one::<serde_json::Value>(json!({
                "a": "a",
                "attr": attr,
                "key": base64url_encode(&key),
                "n": node.handle,
                "i": rand_string(10),
            }))
            .await?;

        self.fs.rename(&node.handle, name).await
    }

    /// Move `node` into `parent`.
    pub async fn move_node(&self, node: &Node, parent: &Node) -> Result<()> {
        self.api
            .request_one::<serde_json::Value>(json!({
                "a": "m",
                "n": node.handle,
                "t": parent.handle,
                "i": rand_string(10),
            }))
            .await?;

        self.fs.move_node(&node.handle, &parent.handle).await
    }

    /// Delete `node`: move it to the trash, or remove it for good when
    /// `destroy` is set.
    pub async fn delete(&self, node: &Node, destroy: bool) -> Result<()> {
        if !destroy {
            let trash = self
                .fs
                .trash()
                .await
                .ok_or_else(|| MegaError::NotFound("trash".to_string()))?;
            return self.move_node(node, &trash).await;
        }

        self.api
            .request_one::<serde_json::Value>(json!({
                "a": "d",
                "n": node.handle,
                "i": rand_string(10),
            }))
            .await?;

        self.fs.discard_node(&node.handle).await;
        Ok(())
    }

    /// Prepare a download of `node`.
    ///
    /// The returned engine lets callers fetch chunks in any order or in
    /// parallel; [`Mega::download_file`] drives it sequentially.
    pub async fn new_download(&self, node: &Node) -> Result<Download> {
        let resp: DownloadResponse = self
            .api
            .request_one(json!({"a": "g", "g": 1, "n": node.handle, "ssl": 2}))
            .await?;

        if let Some(code) = resp.e.and_then(ErrorCode::parse) {
            return Err(MegaError::api(code));
        }

        decrypt_attr(&node.meta().key, &resp.at)?;

        Ok(Download::new(
            self.api.transport().clone(),
            self.api.config().clone(),
            node.meta().clone(),
            force_https(&resp.g),
            resp.s,
        ))
    }

    /// Prepare an upload of `size` bytes named `name` into `parent`.
    pub async fn new_upload(&self, parent: &Node, name: &str, size: u64) -> Result<Upload> {
        let master = self.master_key().await?;
        let resp: UploadResponse = self
            .api
            .request_one(json!({"a": "u", "s": size, "ssl": 2}))
            .await?;

        Ok(Upload::new(
            self.api.clone(),
            master,
            parent.handle.clone(),
            name.to_string(),
            force_https(&resp.p),
            size,
        ))
    }

    fn report(&self, done: u64, total: u64, name: &str) -> Result<()> {
        let mut guard = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(callback) = guard.as_mut() {
            if !callback(&TransferProgress::new(done, total, name)) {
                return Err(MegaError::Cancelled);
            }
        }
        Ok(())
    }

    /// Download `node` into `writer`, verifying the file MAC at the end.
    ///
    /// Up to `workers` chunks are fetched at once but written in order.
    /// `token` is checked before each chunk and again before its data is
    /// written.
    pub async fn download_file<W>(&self, node: &Node, writer: &mut W, token: &CancellationToken) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let download = self.new_download(node).await?;
        let workers = self.api.config().workers.max(1);
        let mut done = 0u64;

        let mut chunks = stream::iter(0..download.chunks())
            .map(|id| {
                let download = &download;
                async move {
                    token.throw_if_cancellation_requested()?;
                    download.download_chunk(id).await
                }
            })
            .buffered(workers);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            token.throw_if_cancellation_requested()?;

            writer.write_all(&chunk).await?;
            done += chunk.len() as u64;
            self.report(done, node.size, &node.name)?;
        }

        drop(chunks);

        writer.flush().await?;
        download.finish().await
    }

    /// Upload `size` bytes from `reader` as a new file in `parent`.
    ///
    /// # Returns
    /// The new node, already merged into the tree.
    pub async fn upload_file<R>(
        &self,
        parent: &Node,
        name: &str,
        size: u64,
        reader: &mut R,
        token: &CancellationToken,
    ) -> Result<Node>
    where
        R: AsyncRead + Unpin,
    {
        if name.is_empty() {
            return Err(MegaError::InvalidArgument("file name cannot be empty".to_string()));
        }
        if !parent.is_folder() {
            return Err(MegaError::InvalidArgument("destination node must be a folder".to_string()));
        }

        let master = self.master_key().await?;
        let upload = self.new_upload(parent, name, size).await?;
        let mut done = 0u64;

        for id in 0..upload.chunks() {
            token.throw_if_cancellation_requested()?;
            let chunk = upload.chunk_location(id)?;
            let mut buf = vec![0u8; chunk.size];
            reader.read_exact(&mut buf).await?;
            token.throw_if_cancellation_requested()?;

            upload.upload_chunk(id, &buf).await?;
            done += buf.len() as u64;
            self.report(done, size, name)?;
        }

        let item = upload.finish().await?;
        self.fs
            .add_fs_node(&item, &master)
            .await?
            .ok_or(MegaError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::a32_to_bytes;
    use crate::crypto::rsa::append_mpi;
    use crate::crypto::keys::paddnull;
    use crate::http::HttpResponse;
    use crate::testutil::{FakeTransport, Recorded};
    use num_bigint::BigUint;
    use num_traits::One;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const MASTER: [u8; 16] = [0x5A; 16];
    const SALT: [u8; 16] = [0x01; 16];
    const PASSWORD: &str = "hunter2";
    const FOLDER_KEY: [u32; 4] = [4, 3, 2, 1];

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_base_url("https://api.test")
            .with_retries(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    fn sid_bytes() -> Vec<u8> {
        (1..=50u8).collect()
    }

    /// RSA key whose decryption is the identity, wrapped like the server
    /// sends it.
    fn login_response(pass_key: [u8; 16]) -> Value {
        let one = BigUint::one();
        let mut blob = Vec::new();
        append_mpi(&mut blob, &((one.clone() << 400u32) + 1u32));
        append_mpi(&mut blob, &((one.clone() << 400u32) + 3u32));
        append_mpi(&mut blob, &one);
        let privk = aes128_ecb_encrypt(&paddnull(&blob, 16), &MASTER).unwrap();

        let mut csid = Vec::new();
        append_mpi(&mut csid, &BigUint::from_bytes_be(&sid_bytes()));

        json!([{
            "k": base64url_encode(&aes128_ecb_encrypt(&MASTER, &pass_key).unwrap()),
            "privk": base64url_encode(&privk),
            "csid": base64url_encode(&csid),
            "u": "me",
        }])
    }

    fn folder(handle: &str, parent: &str, name: &str) -> Value {
        let key = a32_to_block(FOLDER_KEY);
        json!({
            "h": handle, "p": parent, "u": "me", "t": 1, "ts": 10,
            "a": encrypt_attr(&key, &FileAttr::new(name)).unwrap(),
            "k": format!("me:{}", base64url_encode(&aes128_ecb_encrypt(&a32_to_bytes(&FOLDER_KEY), &MASTER).unwrap())),
        })
    }

    fn listing() -> Value {
        json!([{
            "f": [
                {"h": "root0001", "p": "", "u": "me", "t": 2, "a": "", "ts": 1},
                {"h": "inbx0001", "p": "", "u": "me", "t": 3, "a": "", "ts": 1},
                {"h": "trsh0001", "p": "", "u": "me", "t": 4, "a": "", "ts": 1},
                folder("docs0001", "root0001", "Documents"),
                {"h": "bad00001", "p": "root0001", "u": "other", "t": 0, "a": "", "k": "other:AAAAAAAAAAAAAAAAAAAAAA", "ts": 1},
            ],
            "ok": [],
            "sn": "SN-START",
        }])
    }

    /// A server that answers every API command the client sends.
    struct Server {
        transport: Arc<FakeTransport>,
        commands: Arc<StdMutex<Vec<Value>>>,
    }

    impl Server {
        fn new() -> Self {
            Self::with_version(2)
        }

        fn with_version(version: i64) -> Self {
            let pass_key = match version {
                1 => password_key(PASSWORD),
                _ => derive_key(PASSWORD, &SALT).unwrap().0,
            };
            let transport = FakeTransport::new();
            let commands = Arc::new(StdMutex::new(Vec::new()));
            let seen = commands.clone();
            let uploaded = Arc::new(StdMutex::new(Vec::<u8>::new()));
            let file_attr = Arc::new(StdMutex::new(String::new()));

            transport.set_handler(move |req: &Recorded| {
                if req.url.contains("/sc?") {
                    return Some(Ok(HttpResponse::new(200, "-3")));
                }
                if req.url.starts_with("https://ul.test/") {
                    uploaded.lock().unwrap().extend_from_slice(&req.body);
                    return Some(Ok(HttpResponse::new(200, "UPHANDLE")));
                }
                if req.url.starts_with("https://dl.test/") {
                    let range = req.url.rsplit('/').next()?;
                    let (a, b) = range.split_once('-')?;
                    let (a, b): (usize, usize) = (a.parse().ok()?, b.parse().ok()?);
                    let data = uploaded.lock().unwrap()[a..=b].to_vec();
                    return Some(Ok(HttpResponse::new(200, data)));
                }

                let cmd = req.json()[0].clone();
                seen.lock().unwrap().push(cmd.clone());
                let body = match cmd["a"].as_str()? {
                    "us0" if version == 1 => json!([{"v": 1}]),
                    "us0" => json!([{"v": 2, "s": base64url_encode(&SALT)}]),
                    "us" => login_response(pass_key),
                    "f" => listing(),
                    "uq" => json!([{"mstrg": 1000, "cstrg": 250, "cstrgn": {"root0001": [250, 3, 1]}}]),
                    "p" => {
                        let n = &cmd["n"][0];
                        let handle = if n["t"] == 1 { "newd0001" } else { "newf0001" };
                        if n["t"] == 0 {
                            *file_attr.lock().unwrap() = n["a"].as_str()?.to_string();
                        }
                        json!([{"f": [{
                            "h": handle, "p": cmd["t"], "u": "me", "t": n["t"], "ts": 20,
                            "a": n["a"], "k": format!("me:{}", n["k"].as_str()?), "s": uploaded.lock().unwrap().len(),
                        }]}])
                    }
                    "u" => json!([{"p": "http://ul.test/up"}]),
                    "g" => json!([{
                        "g": "http://dl.test/dl",
                        "s": uploaded.lock().unwrap().len(),
                        "at": file_attr.lock().unwrap().clone(),
                    }]),
                    "a" | "m" | "d" => json!([0]),
                    _ => return None,
                };
                Some(Ok(HttpResponse::new(200, body.to_string())))
            });

            Self { transport, commands }
        }

        fn client(&self) -> Mega {
            self.client_with(config())
        }

        fn client_with(&self, config: ClientConfig) -> Mega {
            Mega::with_transport(config, self.transport.clone())
        }

        fn commands(&self) -> Vec<Value> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_login_loads_tree() {
        let server = Server::new();
        let mega = server.client();

        mega.login("User@Example.com", PASSWORD, None).await.unwrap();
        assert_eq!(mega.status().await, SessionStatus::LoggedIn);

        let cmds = server.commands();
        assert_eq!(cmds[0], json!({"a": "us0", "user": "user@example.com"}));
        let (_, auth_key) = derive_key(PASSWORD, &SALT).unwrap();
        assert_eq!(cmds[1]["uh"], base64url_encode(&auth_key));
        assert!(cmds[1].get("sek").is_some());
        assert!(cmds[1].get("mfa").is_none());
        assert_eq!(cmds[2], json!({"a": "f", "c": 1}));

        assert_eq!(mega.api().session_id().await, base64url_encode(&sid_bytes()[..43]));
        assert_eq!(mega.root().await.unwrap().name, "Cloud Drive");
        assert_eq!(mega.trash().await.unwrap().name, "Trash");
        assert_eq!(mega.inbox().await.unwrap().name, "InBox");
        assert_eq!(*mega.ssn.lock().await, "SN-START");

        let root = mega.root().await.unwrap();
        let children = mega.children(&root).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Documents");
        assert!(mega.node("bad00001").await.is_none());

        mega.logout().await;
        assert_eq!(mega.status().await, SessionStatus::LoggedOut);
        assert_eq!(mega.api().sn().await, 0);
        assert_eq!(mega.api().session_id().await, "");
        assert!(mega.ssn.lock().await.is_empty());
        assert!(mega.dump_session().await.is_some());
    }

    #[tokio::test]
    async fn test_login_legacy_account() {
        let server = Server::with_version(1);
        let mega = server.client();

        mega.login("a@b.c", PASSWORD, None).await.unwrap();
        assert_eq!(mega.status().await, SessionStatus::LoggedIn);

        let cmds = server.commands();
        assert_eq!(cmds[1], json!({"a": "us", "user": "a@b.c", "uh": "HBfMagaBx4w"}));
        assert!(cmds[1].get("sek").is_none());
        assert_eq!(mega.api().session_id().await, base64url_encode(&sid_bytes()[..43]));
        assert_eq!(mega.root().await.unwrap().name, "Cloud Drive");

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, Some("123456")).await.unwrap();
        assert_eq!(server.commands()[1]["mfa"], "123456");

        let blob = mega.dump_session().await.unwrap();
        mega.logout().await;

        let resumed = server.client();
        assert!(resumed.dump_session().await.is_none());
        resumed.fast_login(&blob).await.unwrap();
        assert_eq!(resumed.api().session_id().await, base64url_encode(&sid_bytes()[..43]));
        assert_eq!(resumed.dump_session().await.unwrap(), blob);
        assert_eq!(resumed.root().await.unwrap().name, "Cloud Drive");
        resumed.logout().await;
    }

    #[tokio::test]
    async fn test_unsupported_prelogin_version() {
        let transport = FakeTransport::new();
        transport.push_json(json!([{"v": 3}]));
        let mega = Mega::with_transport(config(), transport.clone());
        let err = mega.login("a@b.c", "x", None).await.unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert_eq!(mega.status().await, SessionStatus::LoggedOut);

        transport.push_json(json!([{"v": 0}]));
        assert!(mega.login("a@b.c", "x", None).await.is_err());
    }

    #[tokio::test]
    async fn test_node_operations() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let root = mega.root().await.unwrap();

        let dir = mega.create_dir("Music", &root).await.unwrap();
        assert_eq!(dir.name, "Music");
        assert_eq!(dir.parent.as_deref(), Some("root0001"));
        let cmd = server.commands().pop().unwrap();
        assert_eq!(cmd["n"][0]["h"], "xxxxxxxx");
        assert_eq!(cmd["i"].as_str().unwrap().len(), 10);

        mega.rename(&dir, "Tunes").await.unwrap();
        assert_eq!(mega.node("newd0001").await.unwrap().name, "Tunes");
        let cmd = server.commands().pop().unwrap();
        let attr = cmd["attr"].as_str().unwrap();
        assert_eq!(decrypt_attr(&dir.meta().key, attr).unwrap().name, "Tunes");

        let docs = mega.node("docs0001").await.unwrap();
        mega.move_node(&dir, &docs).await.unwrap();
        assert_eq!(mega.path_lookup(&root, &["Documents", "Tunes"]).await.unwrap().len(), 2);

        mega.delete(&dir, false).await.unwrap();
        let trash = mega.trash().await.unwrap();
        assert_eq!(mega.children(&trash).await.unwrap()[0].handle, "newd0001");

        mega.delete(&dir, true).await.unwrap();
        assert!(mega.node("newd0001").await.is_none());
        assert!(mega.children(&trash).await.unwrap().is_empty());

        let quota = mega.get_quota().await.unwrap();
        assert_eq!(quota.free(), 750);
        assert_eq!(quota.per_node["root0001"], vec![250, 3, 1]);

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_rename_rejects_special_roots() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let sent = server.commands().len();

        for node in [mega.root().await.unwrap(), mega.trash().await.unwrap(), mega.inbox().await.unwrap()] {
            let err = mega.rename(&node, "x").await.unwrap_err();
            assert!(matches!(err, MegaError::InvalidArgument(_)));
        }
        assert_eq!(server.commands().len(), sent);
        assert_eq!(mega.root().await.unwrap().name, "Cloud Drive");

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let root = mega.root().await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        mega.watch_progress(Box::new(move |p: &TransferProgress| {
            c.fetch_add(1, Ordering::SeqCst);
            p.done <= p.total
        }));

        let content = b"hello world".to_vec();
        let token = CancellationToken::new();
        let node = mega
            .upload_file(&root, "hello.txt", content.len() as u64, &mut content.as_slice(), &token)
            .await
            .unwrap();
        assert_eq!(node.name, "hello.txt");
        assert_eq!(node.size, 11);
        assert_eq!(mega.path_lookup(&root, &["hello.txt"]).await.unwrap()[0].handle, "newf0001");

        let urls: Vec<_> = server.transport.requests().into_iter().map(|r| r.url).collect();
        assert!(urls.contains(&"https://ul.test/up/0".to_string()));

        // the fake storage serves back what was uploaded, so the MAC must match
        let mut out = Vec::new();
        mega.download_file(&node, &mut out, &token).await.unwrap();
        assert_eq!(out, content);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_parallel_download_keeps_order() {
        let server = Server::new();
        let mega = server.client_with(config().with_workers(3));
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let root = mega.root().await.unwrap();

        let content: Vec<u8> = (0..700_000u32).map(|i| (i % 253) as u8).collect();
        let token = CancellationToken::new();
        let node = mega
            .upload_file(&root, "big.bin", content.len() as u64, &mut content.as_slice(), &token)
            .await
            .unwrap();
        assert_eq!(node.size, 700_000);

        let mut out = Vec::new();
        mega.download_file(&node, &mut out, &token).await.unwrap();
        assert_eq!(out, content);

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_cancellation_before_first_chunk() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let root = mega.root().await.unwrap();

        let token = CancellationToken::new();
        token.cancel().unwrap();
        let err = mega
            .upload_file(&root, "x.bin", 3, &mut &b"abc"[..], &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!server.transport.requests().iter().any(|r| r.url.starts_with("https://ul.test/")));

        mega.watch_progress(Box::new(|_: &TransferProgress| false));
        let token = CancellationToken::new();
        let err = mega
            .upload_file(&root, "x.bin", 3, &mut &b"abc"[..], &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        mega.clear_progress();
        let node = mega
            .upload_file(&root, "x.bin", 3, &mut &b"abc"[..], &token)
            .await
            .unwrap();
        assert_eq!(node.name, "x.bin");

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let server = Server::new();
        let mega = server.client();
        mega.login("user@example.com", PASSWORD, None).await.unwrap();
        let root = mega.root().await.unwrap();
        let token = CancellationToken::new();

        let err = mega.upload_file(&root, "", 0, &mut &b""[..], &token).await.unwrap_err();
        assert!(matches!(err, MegaError::InvalidArgument(_)));

        let mut file = root.clone();
        file.node_type = NodeType::File;
        let err = mega.upload_file(&file, "a", 0, &mut &b""[..], &token).await.unwrap_err();
        assert!(matches!(err, MegaError::InvalidArgument(_)));

        mega.logout().await;
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let mega = Mega::with_transport(config(), FakeTransport::new());
        let root = Node::new("root0001", NodeType::Root);
        assert!(matches!(
            mega.create_dir("x", &root).await,
            Err(MegaError::InvalidState(_))
        ));
        assert!(mega.dump_session().await.is_none());
    }
}
