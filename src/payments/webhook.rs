//! Webhook signature helpers
//!
//! Providers sign the raw request body with HMAC and send the hex digest in
//! a header. Verification must run over the exact bytes received.

use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use serde_json::Value;
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    HmacSha256,
    HmacSha512,
}

/// Hex-encoded HMAC of `payload`
pub fn sign_hex(algorithm: SignatureAlgorithm, secret: &[u8], payload: &[u8]) -> String {
    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Constant-time check of a hex signature. Malformed hex is a mismatch.
pub fn verify_hex(
    algorithm: SignatureAlgorithm,
    secret: &[u8],
    payload: &[u8],
    signature: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.verify_slice(&provided).is_ok()
        }
        SignatureAlgorithm::HmacSha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.verify_slice(&provided).is_ok()
        }
    }
}

/// First non-empty header among `names`
pub fn header_str<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Sorted-key, whitespace-free JSON bytes.
///
/// Only for callers that no longer hold the raw body; the result matches a
/// provider's signature only if the provider signs this exact form.
/// Non-ASCII characters are emitted as UTF-8, not `\u` escapes.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
