//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use tasksmith::{ModelClient, ModelRequest, UpstreamError};

/// A scripted model client.
///
/// Replies are consumed in order; once the script runs out, the last reply
/// is repeated. Every request is recorded.
pub struct StubClient {
    script: Mutex<VecDeque<Result<String, UpstreamError>>>,
    last: Mutex<Option<Result<String, UpstreamError>>>,
    calls: AtomicU32,
    requests: Mutex<Vec<ModelRequest>>,
}

impl StubClient {
    pub fn new(script: Vec<Result<String, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Always fail with `error`.
    pub fn failing(error: UpstreamError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for StubClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
            .unwrap_or_else(|| Err(UpstreamError::new("stub has no script")))
    }
}

/// Convenience for building a category list.
pub fn categories(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}
