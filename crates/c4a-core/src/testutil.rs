//! Test utilities: a scripted [`Executor`] for exercising the clients
//! without a server.
//!
//! The mock uses `Arc<Mutex<_>>` so clones share the response queue and the
//! request log, letting tests assert on what was sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::error::CloudError;
use crate::traits::{ApiRequest, Executor};

/// Executor that replays queued responses and records every request.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    /// Each call pops the front. When empty, calls return `{}`.
    responses: Arc<Mutex<VecDeque<Result<Value, CloudError>>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<Value, CloudError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, response: Result<Value, CloudError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Executor for MockExecutor {
    async fn execute(&self, request: ApiRequest) -> Result<Value, CloudError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}
