//! Error taxonomy for payment operations
//!
//! Every error carries a stable machine-readable code (`code()`), a human
//! message (`Display`) and a details map (`details()`) so callers can branch
//! without matching on strings.

use crate::payments::types::Provider;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

/// Context attached to every error returned by a provider API
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiFailure {
    pub message: String,
    pub status_code: Option<u16>,
    pub provider: Option<Provider>,
    pub raw_response: Value,
}

impl ApiFailure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_raw_response(mut self, raw_response: Value) -> Self {
        self.raw_response = raw_response;
        self
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.provider, self.status_code) {
            (Some(provider), Some(status)) => {
                write!(f, "{} (provider={}, status={})", self.message, provider, status)
            }
            (Some(provider), None) => write!(f, "{} (provider={})", self.message, provider),
            (None, Some(status)) => write!(f, "{} (status={})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

/// Payment client errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentError {
    /// Bad or missing provider setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown or unconfigured provider
    #[error("Invalid provider '{provider}'. Available choices are: {available:?}")]
    InvalidProvider {
        provider: String,
        available: Vec<Provider>,
    },

    /// Credential or token acquisition failure
    #[error("Authentication failed: {0}")]
    Authentication(ApiFailure),

    /// Malformed transaction input, raised before any network call
    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Transport-level failure (connection refused, timeout)
    #[error("Network error: {message}")]
    Network {
        provider: Option<Provider>,
        message: String,
        timeout: bool,
    },

    /// Provider answered with a non-success status
    #[error("API error: {0}")]
    Api(ApiFailure),

    #[error("Payment failed: {0}")]
    Payment(ApiFailure),

    #[error("Refund failed: {0}")]
    Refund(ApiFailure),

    #[error("Cancellation failed: {0}")]
    Cancellation(ApiFailure),

    /// Provider answered 429
    #[error("Rate limit exceeded: {0}")]
    RateLimit(ApiFailure),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(ApiFailure),

    /// Provider has no primitive for the requested action
    #[error("{provider} does not support '{operation}'")]
    UnsupportedOperation {
        provider: Provider,
        operation: &'static str,
    },

    /// Webhook signature mismatch or missing signature
    #[error("Webhook validation failed for {provider}: {message}")]
    WebhookValidation { provider: Provider, message: String },
}

impl PaymentError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation<S: Into<String>>(field: Option<&str>, message: S) -> Self {
        Self::Validation {
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn network<S: Into<String>>(provider: Option<Provider>, message: S) -> Self {
        Self::Network {
            provider,
            message: message.into(),
            timeout: false,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidProvider { .. } => "invalid_provider",
            Self::Authentication(_) => "authentication_error",
            Self::Validation { .. } => "validation_error",
            Self::Network { timeout: true, .. } => "network_timeout",
            Self::Network { .. } => "network_error",
            Self::Api(_) => "api_error",
            Self::Payment(_) => "payment_error",
            Self::Refund(_) => "refund_error",
            Self::Cancellation(_) => "cancellation_error",
            Self::RateLimit(_) => "rate_limit_exceeded",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::WebhookValidation { .. } => "webhook_validation_error",
        }
    }

    /// Provider API context, for the variants that carry one
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Authentication(failure)
            | Self::Api(failure)
            | Self::Payment(failure)
            | Self::Refund(failure)
            | Self::Cancellation(failure)
            | Self::RateLimit(failure)
            | Self::TransactionNotFound(failure) => Some(failure),
            _ => None,
        }
    }

    /// True for every error produced from a provider's HTTP answer
    pub fn is_api_error(&self) -> bool {
        !matches!(self, Self::Authentication(_)) && self.api_failure().is_some()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.api_failure().and_then(|failure| failure.status_code)
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::Network { provider, .. } => *provider,
            Self::UnsupportedOperation { provider, .. }
            | Self::WebhookValidation { provider, .. } => Some(*provider),
            _ => self.api_failure().and_then(|failure| failure.provider),
        }
    }

    pub fn raw_response(&self) -> Option<&Value> {
        self.api_failure().map(|failure| &failure.raw_response)
    }

    /// Whether the caller may reasonably retry. Nothing is retried internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimit(_) => true,
            _ => self.status_code().is_some_and(|status| status >= 500),
        }
    }

    /// Diagnostic details for logs and API consumers
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            Self::InvalidProvider { provider, available } => {
                details.insert("provider".into(), json!(provider));
                details.insert("available".into(), json!(available));
            }
            Self::Validation { field, .. } => {
                details.insert("field".into(), json!(field));
            }
            Self::Network {
                provider, timeout, ..
            } => {
                details.insert("provider".into(), json!(provider));
                details.insert("timeout".into(), json!(timeout));
            }
            Self::UnsupportedOperation {
                provider,
                operation,
            } => {
                details.insert("provider".into(), json!(provider));
                details.insert("operation".into(), json!(operation));
            }
            Self::WebhookValidation { provider, .. } => {
                details.insert("provider".into(), json!(provider));
            }
            _ => {}
        }
        if let Some(failure) = self.api_failure() {
            details.insert("status_code".into(), json!(failure.status_code));
            details.insert("provider".into(), json!(failure.provider));
            details.insert("raw_response".into(), failure.raw_response.clone());
        }
        details
    }
}

/// Which API error variant a non-success HTTP answer should become
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Api,
    Authentication,
    Payment,
    Refund,
    Cancellation,
    NotFound,
}

impl ApiErrorKind {
    pub fn into_error(self, failure: ApiFailure) -> PaymentError {
        match self {
            Self::Api => PaymentError::Api(failure),
            Self::Authentication => PaymentError::Authentication(failure),
            Self::Payment => PaymentError::Payment(failure),
            Self::Refund => PaymentError::Refund(failure),
            Self::Cancellation => PaymentError::Cancellation(failure),
            Self::NotFound => PaymentError::TransactionNotFound(failure),
        }
    }
}
