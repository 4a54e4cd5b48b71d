//! Shared helpers for licensing integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tollgate_core::{Error, HttpRequest, HttpResponse, HttpTransport, Result};

pub const BASE_URL: &str = "https://attest.test/v1";

pub fn url(stage: &str) -> String {
    format!("{}/{}", BASE_URL, stage)
}

/// In-memory transport answering by URL and recording every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<Vec<HttpRequest>>,
    failing: Mutex<bool>,
    stalled: Mutex<bool>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every request fails with a network error.
    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        *transport.failing.lock() = true;
        Arc::new(transport)
    }

    /// Every request hangs until the caller gives up.
    pub fn stalled() -> Arc<Self> {
        let transport = Self::default();
        *transport.stalled.lock() = true;
        Arc::new(transport)
    }

    pub fn respond(&self, stage: &str, status: u16, body: Value) {
        self.responses
            .lock()
            .insert(url(stage), HttpResponse::new(status, body.to_string()));
    }

    pub fn respond_raw(&self, stage: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .insert(url(stage), HttpResponse::new(status, body));
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.url.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().push(request.clone());
        if *self.stalled.lock() {
            futures::future::pending::<()>().await;
        }
        if *self.failing.lock() {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::new(200, "{}")))
    }
}
