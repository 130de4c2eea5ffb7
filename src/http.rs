//! HTTP transport used by the API client, the event poller and transfers.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ClientConfig;
use crate::error::{MegaError, Result};

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Check for HTTP 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone()).map_err(|_| MegaError::InvalidResponse)
    }
}

/// Minimal HTTP surface the client needs.
///
/// Non-200 statuses are returned as responses, not errors; callers decide
/// whether they are retryable. Errors are reserved for transport failures.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url`.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse>;

    /// GET `url`.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&ClientConfig::default())
    }

    /// Create a new HTTP client from `config` (timeouts and proxy).
    ///
    /// # Arguments
    /// * `config` - Client settings; `proxy` may be e.g. "http://proxy:8080"
    ///   or "socks5://proxy:1080"
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| MegaError::InvalidArgument(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| MegaError::Custom(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
