//! Client configuration.

use std::time::Duration;

/// Default API endpoint.
pub const API_URL: &str = "https://g.api.mega.co.nz";
/// Retries after the first attempt of an API call or chunk transfer.
pub const RETRIES: u32 = 10;
/// Default request and connect timeout.
pub const TIMEOUT: Duration = Duration::from_secs(10);
/// First backoff delay.
pub const MIN_SLEEP: Duration = Duration::from_millis(10);
/// Backoff ceiling.
pub const MAX_SLEEP: Duration = Duration::from_secs(5);
/// Chunks fetched concurrently by `Mega::download_file`.
pub const WORKERS: usize = 1;

/// Settings shared by the API client, the event poller and the transfer
/// engines.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use megafs::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_retries(3)
///     .with_request_timeout(Duration::from_secs(30));
/// assert_eq!(config.retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without the `/cs` or `/sc` suffix
    pub base_url: String,
    /// Number of retries after the first attempt
    pub retries: u32,
    /// Timeout for a whole request
    pub request_timeout: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// First delay of the exponential backoff
    pub min_sleep: Duration,
    /// Maximum delay of the exponential backoff
    pub max_sleep: Duration,
    /// Optional proxy (e.g. "http://proxy:8080" or "socks5://proxy:1080")
    pub proxy: Option<String>,
    /// Download chunks kept in flight at once (at least 1)
    pub workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: API_URL.to_string(),
            retries: RETRIES,
            request_timeout: TIMEOUT,
            connect_timeout: TIMEOUT,
            min_sleep: MIN_SLEEP,
            max_sleep: MAX_SLEEP,
            proxy: None,
            workers: WORKERS,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the backoff bounds used between retries.
    pub fn with_backoff(mut self, min_sleep: Duration, max_sleep: Duration) -> Self {
        self.min_sleep = min_sleep;
        self.max_sleep = max_sleep.max(min_sleep);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Delay to use after `current`: doubled, capped at `max_sleep`.
    pub(crate) fn next_sleep(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_sleep)
    }
}
