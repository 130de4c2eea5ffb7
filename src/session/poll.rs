//! Background event loop.
//!
//! Long-polls the `sc` channel and applies filesystem events (`t`, `u`,
//! `d`) to the tree. The loop never stops on its own; it runs until the
//! owning session cancels it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::client::parse_error_code;
use crate::api::{ApiClient, ErrorCode, Events, FsEvent};
use crate::error::{MegaError, Result};
use crate::fs::MegaFs;

/// Event tags that are understood but carry nothing for the tree.
const IGNORED_EVENTS: &[&str] = &[
    "s", "s2", "c", "k", "fa", "ua", "psts", "ipc", "opc", "upci", "upco", "ph", "se", "mcc", "mcna", "uac",
];

/// Everything the loop needs from the session.
#[derive(Clone)]
pub(crate) struct PollContext {
    pub api: Arc<ApiClient>,
    pub fs: Arc<MegaFs>,
    pub master_key: [u8; 16],
    pub ssn: Arc<Mutex<String>>,
}

/// Handle to the running event loop.
pub(crate) struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    pub(crate) fn spawn(ctx: PollContext) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { ctx.run(token).await });
        Self { cancel, handle }
    }

    /// Cancel the loop and wait until it has exited.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "event loop ended abnormally");
            }
        }
    }
}

impl PollContext {
    async fn run(self, cancel: CancellationToken) {
        let config = self.api.config().clone();
        let mut failed = false;
        let mut delay = config.min_sleep;

        loop {
            if failed {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(delay) => {}
                }
                delay = config.next_sleep(delay);
            } else {
                delay = config.min_sleep;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.poll_once() => {
                    failed = res.is_err();
                    if let Err(e) = res {
                        debug!(error = %e, "event poll failed");
                    }
                }
            }
        }

        debug!("event loop stopped");
    }

    /// One round trip on the event channel.
    ///
    /// Returns an error when the next poll should back off.
    pub(crate) async fn poll_once(&self) -> Result<()> {
        let url = {
            let ssn = self.ssn.lock().await;
            format!(
                "{}/sc?sn={}&sid={}",
                self.api.config().base_url,
                *ssn,
                self.api.session_id().await
            )
        };

        let response = self.api.transport().post(&url, Vec::new()).await?;
        if !response.is_ok() {
            return Err(MegaError::HttpError(response.status));
        }
        let body = response.text()?;

        let events: Events = match serde_json::from_str(&body) {
            Ok(events) => events,
            Err(_) => return Self::handle_error_body(&body),
        };

        if let Some(wait_url) = events.w.filter(|w| !w.is_empty()) {
            if !events.a.is_empty() {
                warn!(count = events.a.len(), "events received together with a wait URL");
            }
            if let Err(e) = self.api.transport().get(&wait_url).await {
                debug!(error = %e, "wait URL request failed");
            }
            return Ok(());
        }

        if let Some(sn) = events.sn {
            *self.ssn.lock().await = sn;
        }

        for raw in events.a {
            self.dispatch(raw).await;
        }
        Ok(())
    }

    fn handle_error_body(body: &str) -> Result<()> {
        match parse_error_code(body) {
            Some(code) => match ErrorCode::parse(code) {
                Some(ErrorCode::Again) => Err(MegaError::api(ErrorCode::Again)),
                Some(code) => {
                    error!(code = code.code(), "event channel returned an error");
                    Err(MegaError::api(code))
                }
                None => Ok(()),
            },
            None => {
                error!(body = %body, "bad response on event channel");
                Err(MegaError::InvalidResponse)
            }
        }
    }

    async fn dispatch(&self, raw: Value) {
        if let Some(code) = raw.as_i64() {
            if let Some(code) = ErrorCode::parse(code) {
                error!(code = code.code(), "error event");
            }
            return;
        }

        let Some(tag) = raw.get("a").and_then(Value::as_str).map(str::to_string) else {
            warn!(event = %raw, "couldn't parse event");
            return;
        };

        if !matches!(tag.as_str(), "t" | "u" | "d") {
            if !IGNORED_EVENTS.contains(&tag.as_str()) {
                warn!(event = %tag, "unknown event");
            }
            return;
        }

        let res = match serde_json::from_value::<FsEvent>(raw) {
            Ok(event) => match tag.as_str() {
                "t" => self.add_nodes(&event).await,
                "u" => self.update_node(&event).await,
                _ => self.delete_node(&event).await,
            },
            Err(e) => Err(e.into()),
        };

        if let Err(e) = res {
            warn!(event = %tag, error = %e, "failed to apply event");
        }
    }

    async fn add_nodes(&self, event: &FsEvent) -> Result<()> {
        let Some(tree) = &event.t else {
            return Err(MegaError::InvalidResponse);
        };
        for item in &tree.f {
            if let Err(e) = self.fs.add_fs_node(item, &self.master_key).await {
                warn!(handle = %item.handle, error = %e, "failed to add node from event");
            }
        }
        Ok(())
    }

    async fn update_node(&self, event: &FsEvent) -> Result<()> {
        let handle = event.n.as_deref().ok_or(MegaError::InvalidResponse)?;
        self.fs.update_attr(handle, event.at.as_deref(), event.ts).await
    }

    async fn delete_node(&self, event: &FsEvent) -> Result<()> {
        let handle = event.n.as_deref().ok_or(MegaError::InvalidResponse)?;
        if !self.fs.remove_node(handle).await {
            debug!(handle, "delete event for unknown node");
        }
        Ok(())
    }
}
