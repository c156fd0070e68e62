//! Airtel Money payment provider implementation
//!
//! USSD-push collections across Airtel's African footprint. Requests carry
//! an OAuth client-credentials token plus `X-Country`/`X-Currency` headers.
//! Amounts are major units.
//!
//! `extra` keys: `client_id`, `client_secret` (required), `country`,
//! `currency` (defaults for status calls), `webhook_secret`.

use crate::config::ProviderConfig;
use crate::error::{ApiErrorKind, ApiFailure, PaymentError, PaymentResult};
use crate::payments::auth::{TokenCache, DEFAULT_TOKEN_TTL};
use crate::payments::money::{decimal_from_json, decimal_to_json, ensure_positive, AmountLimits};
use crate::payments::providers::common::{
    decode_webhook, field_str, header_value, insert_bearer, json_headers, missing_field,
    require_decimal, timestamp_at, unsupported,
};
use crate::payments::traits::{CustomerField, HeaderOptions, PaymentAdapter, ProviderAdapter};
use crate::payments::transport::{ApiClient, HttpResponse, HttpTransport};
use crate::payments::types::{
    ApiCredentials, Currency, CustomerInfo, Metadata, PaymentResponse, Provider,
    TransactionDetail, TransactionStatus, TransactionStatusResponse, TransactionType,
    WebhookEvent,
};
use crate::payments::webhook::{header_str, verify_hex, SignatureAlgorithm};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const SANDBOX_URL: &str = "https://openapiuat.airtel.africa";
pub const PRODUCTION_URL: &str = "https://openapi.airtel.africa";

const SIGNATURE_HEADERS: &[&str] = &["x-airtel-signature", "x-signature"];

const AMOUNT_LIMITS: &[AmountLimits] = &[
    AmountLimits::new(Currency::Ugx, dec!(500), dec!(10000000)),
    AmountLimits::new(Currency::Tzs, dec!(500), dec!(10000000)),
    AmountLimits::new(Currency::Kes, dec!(10), dec!(500000)),
    AmountLimits::new(Currency::Rwf, dec!(100), dec!(5000000)),
    AmountLimits::new(Currency::Zmw, dec!(1), dec!(50000)),
    AmountLimits::new(Currency::Mwk, dec!(100), dec!(5000000)),
    AmountLimits::new(Currency::Ngn, dec!(50), dec!(1000000)),
    AmountLimits::new(Currency::Cdf, dec!(500), dec!(10000000)),
    AmountLimits::new(Currency::Xof, dec!(100), dec!(5000000)),
    AmountLimits::new(Currency::Ghs, dec!(1), dec!(50000)),
    AmountLimits::new(Currency::Bif, dec!(500), dec!(10000000)),
    AmountLimits::new(Currency::Etb, dec!(10), dec!(500000)),
    AmountLimits::new(Currency::Bwp, dec!(1), dec!(50000)),
    AmountLimits::new(Currency::Zwl, dec!(100), dec!(10000000)),
];

/// Airtel status code of a transaction object. Airtel sends it either as
/// a bare string or as `{"code": ..., "message": ...}`.
fn status_code(transaction: &Value) -> Option<String> {
    field_str(transaction, "/status/code")
        .or_else(|| field_str(transaction, "/status"))
        .or_else(|| field_str(transaction, "/status_code"))
}

/// Airtel Money payment provider
pub struct AirtelMoneyAdapter {
    config: ProviderConfig,
    client_id: String,
    client_secret: String,
    tokens: TokenCache,
    api: ApiClient,
}

impl AirtelMoneyAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        let credentials = ApiCredentials::from_config(&config);
        let (Some(client_id), Some(client_secret)) = (credentials.client_id, credentials.client_secret) else {
            return Err(PaymentError::configuration(
                "Airtel Money requires extra.client_id and extra.client_secret",
            ));
        };

        let api = ApiClient::new(
            Provider::AirtelMoney,
            config.resolve_base_url(SANDBOX_URL, PRODUCTION_URL),
            config.timeout(),
            transport,
        );
        Ok(Self {
            config,
            client_id,
            client_secret,
            tokens: TokenCache::new(),
            api,
        })
    }

    async fn access_token(&self) -> PaymentResult<String> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> PaymentResult<(String, Duration)> {
        debug!("Requesting Airtel Money access token");

        let payload = json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials",
        });
        let response = self
            .api
            .post("/auth/oauth2/token", json_headers(), payload)
            .await?;
        let body = self.api.ensure_success(
            response,
            ApiErrorKind::Authentication,
            "Failed to obtain access token",
        )?;

        let token = field_str(&body, "/access_token").ok_or_else(|| {
            error!("Airtel Money token response has no access_token");
            PaymentError::Authentication(
                ApiFailure::new("Token response has no access_token")
                    .with_provider(Provider::AirtelMoney)
                    .with_raw_response(body.clone()),
            )
        })?;
        let ttl = body
            .get("expires_in")
            .and_then(decimal_from_json)
            .and_then(|secs| secs.to_u64())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        info!("Airtel Money access token obtained, expires in {}s", ttl.as_secs());
        Ok((token, ttl))
    }

    /// Customer country, else the configured default
    fn country_for(&self, customer: &CustomerInfo) -> PaymentResult<String> {
        customer
            .country
            .clone()
            .filter(|country| !country.trim().is_empty())
            .or_else(|| self.config.extra_str("country"))
            .map(|country| country.trim().to_ascii_uppercase())
            .ok_or_else(|| {
                PaymentError::validation(
                    Some("country"),
                    "Airtel Money needs customer.country or extra.country",
                )
            })
    }

    /// Options for calls made without a transaction at hand
    fn default_header_options(&self) -> HeaderOptions {
        let mut options = HeaderOptions::new();
        if let Some(country) = self.config.extra_str("country") {
            options.insert("country".to_string(), country);
        }
        if let Some(currency) = self.config.extra_str("currency") {
            options.insert("currency".to_string(), currency);
        }
        options
    }

    fn currency_of(&self, transaction: &Value, raw: &Value) -> PaymentResult<Currency> {
        field_str(transaction, "/currency")
            .or_else(|| self.config.extra_str("currency"))
            .ok_or_else(|| missing_field(Provider::AirtelMoney, "currency", raw))?
            .parse()
    }

    /// Body of a 2xx answer whose `status.success` is not `false`
    fn ensure_accepted(
        &self,
        response: HttpResponse,
        kind: ApiErrorKind,
        message: &str,
    ) -> PaymentResult<Value> {
        let status = response.status;
        let body = self.api.ensure_success(response, kind, message)?;
        if body.pointer("/status/success") == Some(&Value::Bool(false)) {
            error!("Airtel Money rejected the request: {}", body["status"]);
            return Err(kind.into_error(
                ApiFailure::new(format!(
                    "{}: {}",
                    message,
                    field_str(&body, "/status/message").unwrap_or_default()
                ))
                .with_status(status)
                .with_provider(Provider::AirtelMoney)
                .with_raw_response(body),
            ));
        }
        Ok(body)
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> PaymentResult<Value> {
        let headers = self.get_headers(true, &self.default_header_options()).await?;
        let response = self
            .api
            .get(&format!("/standard/v1/payments/{}", transaction_id), headers, &[])
            .await?;
        let kind = if response.status == 404 {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Api
        };
        self.ensure_accepted(
            response,
            kind,
            &format!("Failed to verify transaction: {}", transaction_id),
        )
    }
}

#[async_trait]
impl PaymentAdapter for AirtelMoneyAdapter {
    fn provider(&self) -> Provider {
        Provider::AirtelMoney
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
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// Options: `country` (ISO alpha-2) and `currency`.
    async fn get_headers(
        &self,
        authorization: bool,
        options: &HeaderOptions,
    ) -> PaymentResult<HeaderMap> {
        let mut headers = json_headers();
        if let Some(country) = options.get("country") {
            headers.insert("x-country", header_value(country)?);
        }
        if let Some(currency) = options.get("currency") {
            headers.insert("x-currency", header_value(currency)?);
        }
        if authorization {
            let token = self.access_token().await?;
            insert_bearer(&mut headers, &token)?;
        }
        Ok(headers)
    }

    fn normalize_status(&self, status: &str) -> TransactionStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "ts" => TransactionStatus::Successful,
            "tf" => TransactionStatus::Failed,
            // ambiguous
            "ta" => TransactionStatus::Pending,
            "tp" => TransactionStatus::Pending,
            "tip" => TransactionStatus::Processing,
            "tn" => TransactionStatus::Failed,
            "tr" => TransactionStatus::Refunded,
            "tc" => TransactionStatus::Cancelled,
            _ => TransactionStatus::Unknown,
        }
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<Value> {
        self.validate_transaction(transaction)?;

        let country = self.country_for(&transaction.customer)?;
        let msisdn: String = transaction
            .customer
            .phone_number
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if msisdn.is_empty() {
            return Err(PaymentError::validation(
                Some("phone_number"),
                "Phone number (msisdn) is required for Airtel Money",
            ));
        }

        Ok(json!({
            "reference": transaction
                .reference
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            "subscriber": {
                "country": country,
                "currency": transaction.currency,
                "msisdn": msisdn,
            },
            "transaction": {
                "amount": decimal_to_json(transaction.amount),
                "country": country,
                "currency": transaction.currency,
                "id": transaction.transaction_id,
            },
        }))
    }

    fn validate_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> bool {
        let Some(signature) = header_str(headers, SIGNATURE_HEADERS) else {
            return false;
        };
        let secret = self
            .config
            .extra_str("webhook_secret")
            .unwrap_or_else(|| self.config.api_key.clone());
        if secret.is_empty() {
            return false;
        }
        verify_hex(SignatureAlgorithm::HmacSha256, secret.as_bytes(), raw_body, signature)
    }

    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> PaymentResult<WebhookEvent> {
        let payload = decode_webhook(self, raw_body, headers)?;
        let transaction = payload.get("transaction").cloned().unwrap_or(Value::Null);

        let transaction_id = field_str(&transaction, "/id")
            .or_else(|| field_str(&transaction, "/airtel_money_id"))
            .ok_or_else(|| missing_field(Provider::AirtelMoney, "transaction.id", &payload))?;

        let mut metadata = Metadata::new();
        if let Some(message) = field_str(&transaction, "/status/message")
            .or_else(|| field_str(&transaction, "/message"))
        {
            metadata.insert("message".into(), Value::String(message));
        }
        if let Some(code) = field_str(&transaction, "/status/response_code") {
            metadata.insert("response_code".into(), Value::String(code));
        }

        let mut context = Metadata::new();
        if let Some(msisdn) = field_str(&transaction, "/msisdn") {
            context.insert("msisdn".into(), Value::String(msisdn));
        }
        if let Some(country) = header_str(headers, &["x-country"]) {
            context.insert("country".into(), Value::String(country.to_string()));
        }
        if let Some(airtel_id) = field_str(&transaction, "/airtel_money_id") {
            context.insert("airtel_money_id".into(), Value::String(airtel_id));
        }

        Ok(WebhookEvent {
            event_type: field_str(&payload, "/event_type")
                .unwrap_or_else(|| "payment_notification".to_string()),
            provider: Provider::AirtelMoney,
            transaction_id,
            status: self.normalize_status(&status_code(&transaction).unwrap_or_default()),
            amount: require_decimal(Provider::AirtelMoney, &transaction, "/amount")?,
            currency: self.currency_of(&transaction, &payload)?,
            created_at: timestamp_at(&transaction, &["/created_at"]).unwrap_or_else(Utc::now),
            raw_data: payload,
            metadata,
            context,
        })
    }

    async fn send_payment(&self, transaction: &TransactionDetail) -> PaymentResult<PaymentResponse> {
        let payload = self.format_transaction(transaction)?;

        info!(
            "Initiating Airtel Money payment: {} {} {}",
            transaction.amount, transaction.currency, transaction.transaction_id
        );

        let mut options = HeaderOptions::new();
        options.insert("country".to_string(), self.country_for(&transaction.customer)?);
        options.insert("currency".to_string(), transaction.currency.to_string());
        let headers = self.get_headers(true, &options).await?;

        let msisdn = payload["subscriber"]["msisdn"].clone();
        let response = self.api.post("/merchant/v1/payments/", headers, payload).await?;
        let body = self.ensure_accepted(response, ApiErrorKind::Payment, "Payment request failed")?;

        let data = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);
        // An accepted collection request stays pending until the subscriber
        // confirms; free text such as "Success." is not a transaction code
        let status = match status_code(&data).map(|code| self.normalize_status(&code)) {
            Some(status) if status != TransactionStatus::Unknown => status,
            _ => TransactionStatus::Pending,
        };
        info!(
            "Airtel Money payment submitted: id={}, status={}",
            transaction.transaction_id, status
        );

        let mut metadata = Metadata::new();
        metadata.insert("msisdn".into(), msisdn);
        if let Some(message) = field_str(&data, "/status/message").or_else(|| field_str(&body, "/status/message")) {
            metadata.insert("message".into(), Value::String(message));
        }

        Ok(PaymentResponse {
            transaction_id: transaction.transaction_id.clone(),
            provider: Provider::AirtelMoney,
            status,
            amount: transaction.amount,
            currency: transaction.currency,
            created_at: Some(Utc::now()),
            expires_at: None,
            reference: transaction.reference.clone(),
            payment_link: None,
            transaction_token: field_str(&data, "/id"),
            customer: Some(transaction.customer.clone()),
            raw_response: body,
            metadata,
        })
    }

    async fn check_status(&self, transaction_id: &str) -> PaymentResult<TransactionStatusResponse> {
        info!("Checking Airtel Money transaction: id={}", transaction_id);

        let body = self.fetch_transaction(transaction_id).await?;
        let transaction = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);

        let amount = require_decimal(Provider::AirtelMoney, &transaction, "/amount")?;

        Ok(TransactionStatusResponse {
            transaction_id: field_str(&transaction, "/id")
                .or_else(|| field_str(&transaction, "/airtel_money_id"))
                .unwrap_or_else(|| transaction_id.to_string()),
            provider: Provider::AirtelMoney,
            status: self.normalize_status(&status_code(&transaction).unwrap_or_default()),
            amount,
            data: transaction,
        })
    }

    async fn cancel_transaction(&self, _transaction_id: &str) -> PaymentResult<bool> {
        Err(unsupported(Provider::AirtelMoney, "cancel_transaction"))
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse> {
        if let Some(amount) = amount {
            ensure_positive(amount)?;
        }
        info!(
            "Refunding Airtel Money transaction: id={}, amount={:?}",
            transaction_id, amount
        );

        let mut payload = json!({ "transaction": { "airtel_money_id": transaction_id } });
        if let Some(amount) = amount {
            payload["transaction"]["amount"] = decimal_to_json(amount);
        }
        if let Some(reason) = reason {
            payload["transaction"]["reason"] = Value::String(reason.to_string());
        }

        let headers = self.get_headers(true, &self.default_header_options()).await?;
        let response = self
            .api
            .post("/standard/v1/payments/refund", headers, payload)
            .await?;
        let body = self.ensure_accepted(response, ApiErrorKind::Refund, "Refund failed")?;
        let transaction = body.pointer("/data/transaction").cloned().unwrap_or(Value::Null);

        let refunded = match transaction.get("amount") {
            Some(_) => require_decimal(Provider::AirtelMoney, &transaction, "/amount")?,
            None => amount.ok_or_else(|| missing_field(Provider::AirtelMoney, "amount", &body))?,
        };

        let mut metadata = Metadata::new();
        if let Some(message) = field_str(&transaction, "/status/message") {
            metadata.insert("message".into(), Value::String(message));
        }
        if let Some(refund_id) = field_str(&transaction, "/id") {
            metadata.insert("refund_id".into(), Value::String(refund_id));
        }

        Ok(PaymentResponse {
            transaction_id: transaction_id.to_string(),
            provider: Provider::AirtelMoney,
            status: self.normalize_status(&status_code(&transaction).unwrap_or_else(|| "tp".to_string())),
            amount: refunded,
            currency: self.currency_of(&transaction, &body)?,
            created_at: Some(Utc::now()),
            expires_at: None,
            reference: Some(format!("refund-{}", transaction_id)),
            payment_link: None,
            transaction_token: None,
            customer: None,
            raw_response: body,
            metadata,
        })
    }

    async fn get_transaction_detail(&self, transaction_id: &str) -> PaymentResult<TransactionDetail> {
        let body = self.fetch_transaction(transaction_id).await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let transaction = data.get("transaction").cloned().unwrap_or(Value::Null);

        let mut customer_metadata = Metadata::new();
        if let Some(kind) = field_str(&data, "/subscriber/type") {
            customer_metadata.insert("subscriber_type".into(), Value::String(kind));
        }
        let customer = CustomerInfo {
            phone_number: field_str(&data, "/subscriber/msisdn"),
            first_name: field_str(&data, "/subscriber/first_name"),
            last_name: field_str(&data, "/subscriber/last_name"),
            country: field_str(&data, "/subscriber/country"),
            metadata: customer_metadata,
            ..Default::default()
        };

        let mut metadata = Metadata::new();
        if let Some(message) = field_str(&transaction, "/status/message") {
            metadata.insert("status_message".into(), Value::String(message));
        }
        if let Some(code) = field_str(&transaction, "/status/response_code") {
            metadata.insert("response_code".into(), Value::String(code));
        }

        Ok(TransactionDetail {
            transaction_id: field_str(&transaction, "/id")
                .or_else(|| field_str(&transaction, "/airtel_money_id"))
                .unwrap_or_else(|| transaction_id.to_string()),
            provider: Provider::AirtelMoney,
            amount: require_decimal(Provider::AirtelMoney, &transaction, "/amount")?,
            currency: self.currency_of(&transaction, &body)?,
            status: self.normalize_status(&status_code(&transaction).unwrap_or_default()),
            transaction_type: TransactionType::Payment,
            created_at: timestamp_at(&transaction, &["/created_at"]),
            updated_at: timestamp_at(&transaction, &["/updated_at"]),
            completed_at: timestamp_at(&transaction, &["/completed_at"]),
            customer,
            reference: field_str(&transaction, "/reference").or_else(|| field_str(&transaction, "/id")),
            reason: None,
            callback_url: None,
            return_url: None,
            metadata,
            raw_data: data,
        })
    }
}

impl ProviderAdapter for AirtelMoneyAdapter {
    const PROVIDER: Provider = Provider::AirtelMoney;

    fn from_config(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        Self::new(config, transport)
    }
}
