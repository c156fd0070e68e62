//! FedaPay payment provider implementation
//!
//! Hosted-checkout payments for West Africa. A payment is two calls: create
//! the transaction, then request a checkout token whose URL the customer is
//! redirected to. Amounts are whole major units.
//!
//! `extra` keys: `public_key`, `secret_key` (required), `webhook_secret`.

use crate::config::ProviderConfig;
use crate::error::{ApiErrorKind, PaymentError, PaymentResult};
use crate::payments::money::{decimal_to_json, AmountLimits};
use crate::payments::providers::common::{
    decode_webhook, field_object, field_str, insert_bearer, json_headers, require_decimal,
    require_str, timestamp_at, unsupported,
};
use crate::payments::traits::{CustomerField, HeaderOptions, PaymentAdapter, ProviderAdapter};
use crate::payments::transport::{ApiClient, HttpTransport};
use crate::payments::types::{
    Currency, CustomerInfo, PaymentResponse, Provider, TransactionDetail, TransactionStatus,
    TransactionStatusResponse, TransactionType, WebhookEvent,
};
use crate::payments::webhook::{header_str, verify_hex, SignatureAlgorithm};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const SANDBOX_URL: &str = "https://sandbox-api.fedapay.com";
pub const PRODUCTION_URL: &str = "https://api.fedapay.com";

const SIGNATURE_HEADER: &str = "x-fedapay-signature";

const AMOUNT_LIMITS: &[AmountLimits] = &[
    AmountLimits::new(Currency::Xof, dec!(100), dec!(1000000)),
    AmountLimits::new(Currency::Gnf, dec!(1000), dec!(1000000)),
    AmountLimits::new(Currency::Usd, dec!(1), dec!(10000)),
    AmountLimits::new(Currency::Eur, dec!(1), dec!(10000)),
];

/// Calling codes FedaPay accepts, longest first within each length class
const CALLING_CODES: &[(&str, &str)] = &[
    ("229", "bj"),
    ("228", "tg"),
    ("225", "ci"),
    ("221", "sn"),
    ("226", "bf"),
    ("223", "ml"),
    ("227", "ne"),
    ("224", "gn"),
    ("237", "cm"),
    ("241", "ga"),
    ("242", "cg"),
    ("243", "cd"),
    ("233", "gh"),
    ("234", "ng"),
    ("33", "fr"),
    ("1", "us"),
];

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+|00)?(\d{6,15})$").expect("phone pattern is valid"));

/// Splits a phone number into `(national_number, country)`.
///
/// International numbers (`+229...` or `00229...`) carry their own country.
/// Local numbers need `fallback_country`.
fn split_phone(raw: &str, fallback_country: Option<&str>) -> PaymentResult<(String, String)> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let invalid = || PaymentError::validation(Some("phone_number"), format!("Invalid phone number '{}'", raw));
    let captures = PHONE_PATTERN.captures(&compact).ok_or_else(invalid)?;
    let digits = &captures[2];

    if captures.get(1).is_some() {
        return CALLING_CODES
            .iter()
            .find(|(code, _)| digits.starts_with(code) && digits.len() > code.len() + 5)
            .map(|(code, country)| (digits[code.len()..].to_string(), country.to_string()))
            .ok_or_else(invalid);
    }

    let country = fallback_country
        .filter(|country| !country.trim().is_empty())
        .ok_or_else(|| {
            PaymentError::validation(
                Some("country"),
                "A local phone number needs customer.country",
            )
        })?;
    Ok((digits.to_string(), country.trim().to_ascii_lowercase()))
}

/// FedaPay wraps single resources as `{"v1/transaction": {...}}`.
fn transaction_object(body: &Value) -> Value {
    body.get("v1/transaction").cloned().unwrap_or_else(|| body.clone())
}

/// FedaPay payment provider
pub struct FedapayAdapter {
    config: ProviderConfig,
    secret_key: String,
    webhook_secret: Option<String>,
    api: ApiClient,
}

impl FedapayAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        let secret_key = config.extra_str("secret_key").ok_or_else(|| {
            PaymentError::configuration("FedaPay requires extra.secret_key")
        })?;
        if config.extra_str("public_key").is_none() {
            return Err(PaymentError::configuration("FedaPay requires extra.public_key"));
        }

        let api = ApiClient::new(
            Provider::Fedapay,
            config.resolve_base_url(SANDBOX_URL, PRODUCTION_URL),
            config.timeout(),
            transport,
        );
        Ok(Self {
            webhook_secret: config.extra_str("webhook_secret"),
            secret_key,
            config,
            api,
        })
    }

    /// Currency of a FedaPay transaction object. FedaPay only echoes the ISO
    /// code when the currency is expanded; otherwise XOF, its settlement
    /// currency, is assumed.
    fn currency_of(&self, transaction: &Value) -> Currency {
        field_str(transaction, "/currency/iso")
            .and_then(|iso| iso.parse().ok())
            .unwrap_or(Currency::Xof)
    }

    async fn create_token(&self, transaction_id: &str) -> PaymentResult<Value> {
        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .post(&format!("/v1/transactions/{}/token", transaction_id), headers, json!({}))
            .await?;
        self.api
            .ensure_success(response, ApiErrorKind::Payment, "Failed to create FedaPay checkout token")
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> PaymentResult<Value> {
        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .get(&format!("/v1/transactions/{}", transaction_id), headers, &[])
            .await?;
        let kind = if response.status == 404 {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Api
        };
        let body = self
            .api
            .ensure_success(response, kind, "Failed to retrieve FedaPay transaction")?;
        Ok(transaction_object(&body))
    }
}

#[async_trait]
impl PaymentAdapter for FedapayAdapter {
    fn provider(&self) -> Provider {
        Provider::Fedapay
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn amount_limits(&self) -> &'static [AmountLimits] {
        AMOUNT_LIMITS
    }

    fn required_customer_fields(&self) -> &'static [CustomerField] {
        &[CustomerField::PhoneNumber]
    }

    fn validate_credentials(&self) -> bool {
        !self.secret_key.trim().is_empty() && self.config.extra_str("public_key").is_some()
    }

    async fn get_headers(
        &self,
        authorization: bool,
        _options: &HeaderOptions,
    ) -> PaymentResult<HeaderMap> {
        let mut headers = json_headers();
        if authorization {
            insert_bearer(&mut headers, &self.secret_key)?;
        }
        Ok(headers)
    }

    fn normalize_status(&self, status: &str) -> TransactionStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "approved" => TransactionStatus::Successful,
            "declined" => TransactionStatus::Declined,
            "canceled" | "cancelled" => TransactionStatus::Cancelled,
            "refunded" | "approved_partially_refunded" => TransactionStatus::Refunded,
            "transferred" => TransactionStatus::Transferred,
            "expired" => TransactionStatus::Expired,
            "pending" => TransactionStatus::Pending,
            _ => TransactionStatus::Unknown,
        }
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<Value> {
        self.validate_transaction(transaction)?;

        if !transaction.amount.fract().is_zero() {
            return Err(PaymentError::validation(
                Some("amount"),
                format!("FedaPay amounts are whole units, got {}", transaction.amount),
            ));
        }

        let customer = &transaction.customer;
        let phone = customer.phone_number.as_deref().unwrap_or_default();
        let (number, country) = split_phone(phone, customer.country.as_deref())?;

        let mut payload = json!({
            "amount": decimal_to_json(transaction.amount),
            "currency": { "iso": transaction.currency },
            "description": transaction
                .reason
                .clone()
                .unwrap_or_else(|| format!("Payment {}", transaction.transaction_id)),
            "merchant_reference": transaction
                .reference
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            "custom_metadata": transaction.metadata,
            "customer": {
                "firstname": customer.first_name,
                "lastname": customer.last_name,
                "email": customer.email,
                "phone_number": { "number": number, "country": country },
            },
        });

        if let Some(callback_url) = transaction
            .callback_url
            .as_ref()
            .or(self.config.callback_url.as_ref())
        {
            payload["callback_url"] = Value::String(callback_url.clone());
        }

        Ok(payload)
    }

    /// Header format: `t=<unix timestamp>,s=<hex HMAC-SHA256 of "t.body">`
    fn validate_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> bool {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return false;
        };
        let Some(header) = header_str(headers, &[SIGNATURE_HEADER]) else {
            return false;
        };

        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("s", value)) => signature = Some(value),
                _ => {}
            }
        }
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return false;
        };

        let mut signed = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
        signed.extend_from_slice(timestamp.as_bytes());
        signed.push(b'.');
        signed.extend_from_slice(raw_body);

        verify_hex(SignatureAlgorithm::HmacSha256, secret.as_bytes(), &signed, signature)
    }

    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> PaymentResult<WebhookEvent> {
        let payload = decode_webhook(self, raw_body, headers)?;
        let entity = payload.get("entity").cloned().unwrap_or(Value::Null);

        let mut context = serde_json::Map::new();
        if let Some(reference) = field_str(&entity, "/reference") {
            context.insert("reference".into(), Value::String(reference));
        }
        if let Some(mode) = field_str(&entity, "/mode") {
            context.insert("mode".into(), Value::String(mode));
        }

        Ok(WebhookEvent {
            event_type: field_str(&payload, "/name").unwrap_or_else(|| "unknown".to_string()),
            provider: Provider::Fedapay,
            transaction_id: require_str(Provider::Fedapay, &entity, "/id")?,
            status: self.normalize_status(&field_str(&entity, "/status").unwrap_or_default()),
            amount: require_decimal(Provider::Fedapay, &entity, "/amount")?,
            currency: self.currency_of(&entity),
            created_at: timestamp_at(&entity, &["/created_at"]).unwrap_or_else(Utc::now),
            metadata: field_object(&entity, "/custom_metadata"),
            raw_data: payload,
            context,
        })
    }

    async fn send_payment(&self, transaction: &TransactionDetail) -> PaymentResult<PaymentResponse> {
        let payload = self.format_transaction(transaction)?;

        info!(
            "Initiating FedaPay payment: {} {} {}",
            transaction.amount, transaction.currency, transaction.transaction_id
        );

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self.api.post("/v1/transactions", headers, payload).await?;
        let body = self
            .api
            .ensure_success(response, ApiErrorKind::Payment, "Payment request failed")?;
        let created = transaction_object(&body);
        let fedapay_id = require_str(Provider::Fedapay, &created, "/id")?;

        let token = self.create_token(&fedapay_id).await?;
        info!("FedaPay checkout created: id={}", fedapay_id);

        let mut metadata = created.as_object().cloned().unwrap_or_default();
        metadata.insert("fedapay_id".into(), Value::String(fedapay_id.clone()));
        metadata.insert(
            "local_transaction_id".into(),
            Value::String(transaction.transaction_id.clone()),
        );

        Ok(PaymentResponse {
            transaction_id: fedapay_id,
            provider: Provider::Fedapay,
            status: self.normalize_status(&field_str(&created, "/status").unwrap_or_else(|| "pending".into())),
            amount: transaction.amount,
            currency: transaction.currency,
            created_at: timestamp_at(&created, &["/created_at"]).or_else(|| Some(Utc::now())),
            expires_at: None,
            reference: transaction
                .reference
                .clone()
                .or_else(|| field_str(&created, "/reference")),
            payment_link: field_str(&token, "/url"),
            transaction_token: field_str(&token, "/token"),
            customer: Some(transaction.customer.clone()),
            raw_response: json!({ "transaction": body, "token": token }),
            metadata,
        })
    }

    async fn check_status(&self, transaction_id: &str) -> PaymentResult<TransactionStatusResponse> {
        info!("Checking FedaPay transaction: id={}", transaction_id);
        let data = self.fetch_transaction(transaction_id).await?;

        Ok(TransactionStatusResponse {
            transaction_id: field_str(&data, "/id").unwrap_or_else(|| transaction_id.to_string()),
            provider: Provider::Fedapay,
            status: self.normalize_status(&field_str(&data, "/status").unwrap_or_default()),
            amount: require_decimal(Provider::Fedapay, &data, "/amount")?,
            data,
        })
    }

    async fn cancel_transaction(&self, transaction_id: &str) -> PaymentResult<bool> {
        info!("Cancelling FedaPay transaction: id={}", transaction_id);

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .put(
                &format!("/v1/transactions/{}", transaction_id),
                headers,
                json!({ "status": "canceled" }),
            )
            .await?;
        let body = self.api.ensure_success(
            response,
            ApiErrorKind::Cancellation,
            "Failed to cancel FedaPay transaction",
        )?;

        let cancelled = field_str(&transaction_object(&body), "/status")
            .map_or(true, |status| self.normalize_status(&status) == TransactionStatus::Cancelled);
        if !cancelled {
            warn!("FedaPay did not cancel transaction {}", transaction_id);
        }
        Ok(cancelled)
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Option<Decimal>,
        _reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse> {
        Err(unsupported(Provider::Fedapay, "refund"))
    }

    async fn get_transaction_detail(&self, transaction_id: &str) -> PaymentResult<TransactionDetail> {
        let data = self.fetch_transaction(transaction_id).await?;

        let customer = CustomerInfo {
            id: field_str(&data, "/customer_id").or_else(|| field_str(&data, "/customer/id")),
            first_name: field_str(&data, "/customer/firstname"),
            last_name: field_str(&data, "/customer/lastname"),
            email: field_str(&data, "/customer/email"),
            ..Default::default()
        };

        Ok(TransactionDetail {
            transaction_id: field_str(&data, "/id").unwrap_or_else(|| transaction_id.to_string()),
            provider: Provider::Fedapay,
            amount: require_decimal(Provider::Fedapay, &data, "/amount")?,
            currency: self.currency_of(&data),
            status: self.normalize_status(&field_str(&data, "/status").unwrap_or_default()),
            transaction_type: TransactionType::Payment,
            created_at: timestamp_at(&data, &["/created_at"]),
            updated_at: timestamp_at(&data, &["/updated_at"]),
            completed_at: timestamp_at(&data, &["/approved_at", "/transferred_at"]),
            customer,
            reference: field_str(&data, "/reference"),
            reason: field_str(&data, "/description"),
            callback_url: field_str(&data, "/callback_url"),
            return_url: None,
            metadata: field_object(&data, "/custom_metadata"),
            raw_data: data,
        })
    }
}

impl ProviderAdapter for FedapayAdapter {
    const PROVIDER: Provider = Provider::Fedapay;

    fn from_config(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        Self::new(config, transport)
    }
}
