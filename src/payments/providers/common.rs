//! Helpers shared by the provider adapters

use crate::error::{ApiFailure, PaymentError, PaymentResult};
use crate::payments::money::decimal_from_json;
use crate::payments::traits::PaymentAdapter;
use crate::payments::types::{Currency, Metadata, Provider};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

pub(crate) fn header_value(value: &str) -> PaymentResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| PaymentError::configuration(format!("Invalid header value: {}", e)))
}

/// `Content-Type` and `Accept` set to JSON
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

pub(crate) fn insert_bearer(headers: &mut HeaderMap, token: &str) -> PaymentResult<()> {
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
    Ok(())
}

pub(crate) fn unsupported(provider: Provider, operation: &'static str) -> PaymentError {
    warn!("{} does not support {}", provider, operation);
    PaymentError::UnsupportedOperation {
        provider,
        operation,
    }
}

/// Verifies the signature and decodes the body, in that order.
pub(crate) fn decode_webhook<A: PaymentAdapter + ?Sized>(
    adapter: &A,
    raw_body: &[u8],
    headers: &HeaderMap,
) -> PaymentResult<Value> {
    if !adapter.validate_webhook(raw_body, headers) {
        warn!("{} webhook signature verification failed", adapter.provider());
        return Err(PaymentError::WebhookValidation {
            provider: adapter.provider(),
            message: "Invalid or missing webhook signature".to_string(),
        });
    }

    serde_json::from_slice(raw_body).map_err(|e| {
        PaymentError::validation(Some("body"), format!("Webhook body is not valid JSON: {}", e))
    })
}

/// String form of a JSON string or number
pub(crate) fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// String at a JSON pointer such as `/data/reference`
pub(crate) fn field_str(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(json_string)
}

/// Object at `pointer` as a metadata map; anything else is empty.
pub(crate) fn field_object(value: &Value, pointer: &str) -> Metadata {
    value
        .pointer(pointer)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Provider answer lacking a field the normalized record needs
pub(crate) fn missing_field(provider: Provider, field: &str, raw: &Value) -> PaymentError {
    PaymentError::Api(
        ApiFailure::new(format!("{} response is missing '{}'", provider, field))
            .with_provider(provider)
            .with_raw_response(raw.clone()),
    )
}

pub(crate) fn require_str(provider: Provider, value: &Value, pointer: &str) -> PaymentResult<String> {
    field_str(value, pointer).ok_or_else(|| missing_field(provider, pointer, value))
}

pub(crate) fn require_decimal(provider: Provider, value: &Value, pointer: &str) -> PaymentResult<Decimal> {
    value
        .pointer(pointer)
        .and_then(decimal_from_json)
        .ok_or_else(|| missing_field(provider, pointer, value))
}

pub(crate) fn require_currency(provider: Provider, value: &Value, pointer: &str) -> PaymentResult<Currency> {
    let code = require_str(provider, value, pointer)?;
    code.parse()
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) or a Unix timestamp in
/// seconds or milliseconds.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                        .map(|naive| naive.and_utc())
                        .ok()
                })
        }
        Value::Number(n) => {
            let ts = n.as_i64()?;
            if ts > 100_000_000_000 {
                DateTime::from_timestamp_millis(ts)
            } else {
                DateTime::from_timestamp(ts, 0)
            }
        }
        _ => None,
    }
}

/// First parseable timestamp among `pointers`
pub(crate) fn timestamp_at(value: &Value, pointers: &[&str]) -> Option<DateTime<Utc>> {
    pointers
        .iter()
        .filter_map(|pointer| value.pointer(pointer))
        .find_map(parse_timestamp)
}
