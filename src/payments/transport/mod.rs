//! HTTP transport used by provider adapters
//!
//! Adapters never talk to reqwest directly. They go through an [`ApiClient`]
//! bound to one provider's base URL and timeout, which delegates to a
//! pluggable [`HttpTransport`]. The default transport is reqwest-backed;
//! [`MockTransport`] replays canned answers in tests.

mod mock;

pub use mock::MockTransport;

use crate::error::{ApiErrorKind, ApiFailure, PaymentError, PaymentResult};
use crate::payments::types::Provider;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Outbound request handed to a transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Status plus decoded body. Non-JSON bodies arrive as `{"raw_response": text}`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> &Value {
        &self.body
    }
}

/// Request/response mechanism beneath every adapter
///
/// Implementations must release any per-request resources before returning,
/// on success and on error.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> PaymentResult<HttpResponse>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> PaymentResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            PaymentError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> PaymentResult<HttpResponse> {
        let parsed = if request.query.is_empty() {
            Url::parse(&request.url)
        } else {
            Url::parse_with_params(&request.url, &request.query)
        };
        let url = parsed.map_err(|e| {
            PaymentError::configuration(format!("Invalid URL '{}': {}", request.url, e))
        })?;

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers)
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        // Read the whole body here so the connection is released on every path
        let text = response.text().await.map_err(transport_error)?;

        Ok(HttpResponse::new(status, decode_body(&text)))
    }
}

fn transport_error(error: reqwest::Error) -> PaymentError {
    PaymentError::Network {
        provider: None,
        message: error.to_string(),
        timeout: error.is_timeout(),
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw_response": text }))
}

/// One provider's view of the transport: base URL, timeout, error mapping
#[derive(Clone)]
pub struct ApiClient {
    provider: Provider,
    base_url: String,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(
        provider: Provider,
        base_url: String,
        timeout: Duration,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one request. 429 becomes `RateLimit`; any other status is
    /// returned for the adapter to interpret.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        headers: HeaderMap,
        params: &[(&str, &str)],
        body: Option<Value>,
    ) -> PaymentResult<HttpResponse> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!("{} request: {} {}", self.provider, method, url);

        let request = HttpRequest {
            method,
            url,
            headers,
            query: params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            body,
            timeout: self.timeout,
        };

        let response = self.transport.send(request).await.map_err(|e| match e {
            PaymentError::Network {
                provider: None,
                message,
                timeout,
            } => {
                error!("{} network error: {}", self.provider, message);
                PaymentError::Network {
                    provider: Some(self.provider),
                    message,
                    timeout,
                }
            }
            other => other,
        })?;

        debug!("{} response status: {}", self.provider, response.status);

        if response.status == 429 {
            warn!("{} rate limited the request", self.provider);
            return Err(PaymentError::RateLimit(
                self.failure("Rate limit reached", &response),
            ));
        }

        Ok(response)
    }

    pub async fn get(
        &self,
        endpoint: &str,
        headers: HeaderMap,
        params: &[(&str, &str)],
    ) -> PaymentResult<HttpResponse> {
        self.request(Method::GET, endpoint, headers, params, None).await
    }

    pub async fn post(&self, endpoint: &str, headers: HeaderMap, body: Value) -> PaymentResult<HttpResponse> {
        self.request(Method::POST, endpoint, headers, &[], Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, headers: HeaderMap, body: Value) -> PaymentResult<HttpResponse> {
        self.request(Method::PUT, endpoint, headers, &[], Some(body)).await
    }

    pub async fn patch(&self, endpoint: &str, headers: HeaderMap, body: Value) -> PaymentResult<HttpResponse> {
        self.request(Method::PATCH, endpoint, headers, &[], Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str, headers: HeaderMap) -> PaymentResult<HttpResponse> {
        self.request(Method::DELETE, endpoint, headers, &[], None).await
    }

    pub fn failure<S: Into<String>>(&self, message: S, response: &HttpResponse) -> ApiFailure {
        ApiFailure::new(message)
            .with_status(response.status)
            .with_provider(self.provider)
            .with_raw_response(response.body.clone())
    }

    /// Body of a 2xx answer, or the `kind` error carrying status and body.
    pub fn ensure_success(
        &self,
        response: HttpResponse,
        kind: ApiErrorKind,
        message: &str,
    ) -> PaymentResult<Value> {
        if response.is_success() {
            return Ok(response.body);
        }
        error!(
            "{} API error: {} (HTTP {}): {}",
            self.provider, message, response.status, response.body
        );
        Err(kind.into_error(self.failure(
            format!("{} with status {}", message, response.status),
            &response,
        )))
    }
}
