//! In-memory transport that replays queued answers and records requests

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Answers requests in FIFO order. An empty queue yields a network error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<PaymentResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, status: u16, body: Value) -> Self {
        self.push_response(status, body);
        self
    }

    pub fn with_error(self, error: PaymentError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    pub fn push_response(&self, status: u16, body: Value) {
        lock(&self.responses).push_back(Ok(HttpResponse::new(status, body)));
    }

    /// Every request seen so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> PaymentResult<HttpResponse> {
        let description = format!("{} {}", request.method, request.url);
        lock(&self.requests).push(request);
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(PaymentError::network(
                None,
                format!("no response queued for {}", description),
            ))
        })
    }
}
