//! Scripted in-memory transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{MegaError, Result};
use crate::http::{HttpResponse, Transport};

/// A request seen by [`FakeTransport`].
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Handler = Box<dyn Fn(&Recorded) -> Option<Result<HttpResponse>> + Send + Sync>;

/// Replies from a queue of canned responses; when the queue is empty the
/// optional handler is consulted.
#[derive(Default)]
pub(crate) struct FakeTransport {
    queue: Mutex<VecDeque<Result<HttpResponse>>>,
    handler: Mutex<Option<Handler>>,
    log: Mutex<Vec<Recorded>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push(200, value.to_string());
    }

    pub fn push_error(&self, err: MegaError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    pub fn set_handler<F>(&self, f: F)
    where
        F: Fn(&Recorded) -> Option<Result<HttpResponse>> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Some(Box::new(f));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    fn reply(&self, req: Recorded) -> Result<HttpResponse> {
        self.log.lock().unwrap().push(req.clone());
        if let Some(resp) = self.queue.lock().unwrap().pop_front() {
            return resp;
        }
        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            if let Some(resp) = handler(&req) {
                return resp;
            }
        }
        Err(MegaError::Custom(format!("unexpected {} {}", req.method, req.url)))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        self.reply(Recorded {
            method: "POST",
            url: url.to_string(),
            body,
        })
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.reply(Recorded {
            method: "GET",
            url: url.to_string(),
            body: Vec::new(),
        })
    }
}
