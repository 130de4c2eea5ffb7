//! Chunked, MAC-verified file transfers.

pub mod chunk;
pub mod download;
pub mod upload;

use std::future::Future;

use tokio::time::{sleep, timeout};
use tracing::debug;

pub use chunk::{ctr_iv, get_chunk_sizes, ChunkSize};
pub use download::Download;
pub use upload::Upload;

use crate::config::ClientConfig;
use crate::crypto::aes::aes128_cbc_mac;
use crate::error::{MegaError, Result};
use crate::http::HttpResponse;

/// Run a chunk request until it returns HTTP 200, with backoff between
/// attempts.
pub(crate) async fn with_retries<F, Fut>(config: &ClientConfig, what: &str, mut op: F) -> Result<HttpResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<HttpResponse>>,
{
    let mut delay = config.min_sleep;
    let mut last_error = None;

    for attempt in 0..=config.retries {
        if attempt > 0 {
            sleep(delay).await;
            delay = config.next_sleep(delay);
        }

        let err = match timeout(config.request_timeout, op()).await {
            Ok(Ok(resp)) if resp.is_ok() => return Ok(resp),
            Ok(Ok(resp)) => MegaError::HttpError(resp.status),
            Ok(Err(e)) => e,
            Err(_) => MegaError::Timeout,
        };
        debug!(what, attempt, error = %err, "chunk request failed");
        last_error = Some(err);
    }

    Err(last_error.unwrap_or_else(|| MegaError::Custom(format!("{} failed", what))))
}

/// Fold the per-chunk MACs into the 8-byte file MAC.
///
/// The chunk MACs are CBC-chained from a zero IV under the content key and
/// the final block is condensed to words `(w0 ^ w1, w2 ^ w3)`.
pub(crate) fn condense_mac(chunk_macs: &[[u8; 16]], key: &[u8; 16]) -> [u8; 8] {
    let chained = aes128_cbc_mac(&chunk_macs.concat(), key, &[0u8; 16]);
    let mut mac = [0u8; 8];
    for i in 0..4 {
        mac[i] = chained[i] ^ chained[i + 4];
        mac[i + 4] = chained[i + 8] ^ chained[i + 12];
    }
    mac
}

/// Rewrite an `http://` transfer URL to `https://`.
pub(crate) fn force_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}
