//! MEGA API client with request/response handling.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

use crate::api::ErrorCode;
use crate::config::ClientConfig;
use crate::error::{MegaError, Result};
use crate::http::Transport;

/// Outcome of a single request attempt.
enum Attempt {
    Done(String),
    Retry(MegaError),
    Abort(MegaError),
}

/// MEGA API client.
///
/// Requests are serialized: the sequence number lock is held for the whole
/// retry loop, so at most one command is in flight per client.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    sn: Mutex<u64>,
    session_id: RwLock<String>,
}

impl ApiClient {
    /// Create a new API client on top of `transport`.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config,
            sn: Mutex::new(0),
            session_id: RwLock::new(String::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Current request sequence number.
    pub async fn sn(&self) -> u64 {
        *self.sn.lock().await
    }

    /// Current session id; empty when not logged in.
    pub async fn session_id(&self) -> String {
        self.session_id.read().await.clone()
    }

    /// Set the session ID for authenticated requests.
    pub async fn set_session_id(&self, sid: impl Into<String>) {
        *self.session_id.write().await = sid.into();
    }

    /// Forget the session id and restart the sequence at zero.
    pub async fn reset(&self) {
        let mut sn = self.sn.lock().await;
        *sn = 0;
        self.session_id.write().await.clear();
    }

    /// Send a raw command batch and return the raw response body.
    ///
    /// The URL is fixed for all attempts. Non-200 statuses, transport
    /// failures and the bare `-3`/`-4` bodies are retried with exponential
    /// backoff; a short body holding a server error code aborts unless the
    /// code is "try again". The sequence number advances once per call,
    /// whatever the outcome.
    ///
    /// # Arguments
    /// * `body` - JSON array of commands, already serialized
    ///
    /// # Returns
    /// Response body on success, otherwise the last error seen
    pub async fn request(&self, body: &str) -> Result<String> {
        let mut sn = self.sn.lock().await;

        let mut url = format!("{}/cs?id={}", self.config.base_url, *sn);
        let sid = self.session_id.read().await.clone();
        if !sid.is_empty() {
            url.push_str("&sid=");
            url.push_str(&sid);
        }

        let mut delay = self.config.min_sleep;
        let mut last_error = None;
        let mut result = None;

        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying API request");
                sleep(delay).await;
                delay = self.config.next_sleep(delay);
            }

            match self.attempt(&url, body).await {
                Attempt::Done(text) => {
                    result = Some(text);
                    break;
                }
                Attempt::Retry(err) => {
                    trace!(error = %err, "API attempt failed");
                    last_error = Some(err);
                }
                Attempt::Abort(err) => {
                    last_error = Some(err);
                    break;
                }
            }
        }

        *sn += 1;

        match result {
            Some(text) => Ok(text),
            None => Err(last_error
                .unwrap_or_else(|| MegaError::Custom("API request failed".to_string()))),
        }
    }

    async fn attempt(&self, url: &str, body: &str) -> Attempt {
        let response = match timeout(
            self.config.request_timeout,
            self.transport.post(url, body.as_bytes().to_vec()),
        )
        .await
        {
            Err(_) => return Attempt::Retry(MegaError::Timeout),
            Ok(Err(e)) => return Attempt::Retry(e),
            Ok(Ok(r)) => r,
        };

        if !response.is_ok() {
            return Attempt::Retry(MegaError::HttpError(response.status));
        }

        let text = match response.text() {
            Ok(text) => text,
            Err(e) => return Attempt::Retry(e),
        };

        match text.as_str() {
            "-3" => return Attempt::Retry(MegaError::api(ErrorCode::Again)),
            "-4" => return Attempt::Retry(MegaError::api(ErrorCode::RateLimit)),
            _ => {}
        }

        if text.len() < 6 {
            if let Some(code) = parse_error_code(&text).and_then(ErrorCode::parse) {
                return match code {
                    ErrorCode::Again => Attempt::Retry(MegaError::api(code)),
                    _ => Attempt::Abort(MegaError::api(code)),
                };
            }
        }

        Attempt::Done(text)
    }

    /// Send a single command and decode the first element of the reply.
    ///
    /// A bare negative number in that position is turned into the matching
    /// API error.
    ///
    /// # Example
    /// ```no_run
    /// # use megafs::api::{ApiClient, QuotaResponse};
    /// # async fn example(api: &ApiClient) -> megafs::Result<()> {
    /// let quota: QuotaResponse = api
    ///     .request_one(serde_json::json!({"a": "uq", "xfer": 1, "strg": 1}))
    ///     .await?;
    /// println!("{} / {}", quota.cstrg, quota.mstrg);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request_one<T: DeserializeOwned>(&self, command: Value) -> Result<T> {
        let action = command.get("a").and_then(Value::as_str).unwrap_or("").to_string();
        let body = serde_json::to_string(&[command])?;
        debug!(action = %action, "API request");

        let text = self.request(&body).await?;
        let value: Value = serde_json::from_str(&text)?;

        let first = match value {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            Value::Number(n) => Value::Number(n),
            _ => return Err(MegaError::InvalidResponse),
        };

        if let Some(code) = first.as_i64().and_then(ErrorCode::parse) {
            return Err(MegaError::api(code));
        }

        Ok(serde_json::from_value(first)?)
    }
}

/// Read `[code]` or `code` from a short response body.
pub(crate) fn parse_error_code(text: &str) -> Option<i64> {
    if let Ok(codes) = serde_json::from_str::<Vec<i64>>(text) {
        return codes.first().copied();
    }
    serde_json::from_str::<i64>(text.trim()).ok()
}
