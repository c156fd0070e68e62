//! Paystack payment provider implementation
//!
//! This module provides integration with Paystack's payment API for processing
//! payments in Nigeria (NGN), Ghana (GHS), South Africa (ZAR) and USD.
//!
//! Paystack amounts travel in subunits (kobo, pesewas, cents). Every
//! currency it supports has a two-digit subunit.

use crate::config::ProviderConfig;
use crate::error::{ApiErrorKind, ApiFailure, PaymentError, PaymentResult};
use crate::payments::money::{ensure_positive, scale_from_minor, scale_to_minor, to_minor_units, AmountLimits};
use crate::payments::providers::common::{
    decode_webhook, field_object, field_str, insert_bearer, json_headers, missing_field,
    require_currency, require_decimal, require_str, timestamp_at, unsupported,
};
use crate::payments::traits::{CustomerField, HeaderOptions, PaymentAdapter, ProviderAdapter};
use crate::payments::transport::{ApiClient, HttpResponse, HttpTransport};
use crate::payments::types::{
    Currency, CustomerInfo, PaymentResponse, Provider, TransactionDetail, TransactionStatus,
    TransactionStatusResponse, TransactionType, WebhookEvent,
};
use crate::payments::webhook::{header_str, verify_hex, SignatureAlgorithm};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

pub const SANDBOX_URL: &str = "https://api.paystack.co";
pub const PRODUCTION_URL: &str = "https://api.paystack.co";

const SIGNATURE_HEADER: &str = "x-paystack-signature";
const SUBUNIT_EXPONENT: u32 = 2;

const AMOUNT_LIMITS: &[AmountLimits] = &[
    AmountLimits::new(Currency::Ngn, dec!(50), dec!(10000000)),
    AmountLimits::new(Currency::Ghs, dec!(0.10), dec!(10000000)),
    AmountLimits::new(Currency::Usd, dec!(2), dec!(10000000)),
    AmountLimits::new(Currency::Zar, dec!(1), dec!(10000000)),
];

/// Paystack payment provider
pub struct PaystackAdapter {
    config: ProviderConfig,
    api: ApiClient,
}

impl PaystackAdapter {
    /// Create a new Paystack adapter. The secret key goes in `api_key`.
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PaymentError::configuration(
                "Paystack requires a secret key in api_key",
            ));
        }

        let api = ApiClient::new(
            Provider::Paystack,
            config.resolve_base_url(SANDBOX_URL, PRODUCTION_URL),
            config.timeout(),
            transport,
        );
        Ok(Self { config, api })
    }

    /// Unwraps Paystack's `{status, message, data}` envelope.
    ///
    /// A 2xx answer with `status: false` is still a failure.
    fn envelope(
        &self,
        response: HttpResponse,
        kind: ApiErrorKind,
        message: &str,
    ) -> PaymentResult<(Value, Value)> {
        let status_code = response.status;
        let body = self.api.ensure_success(response, kind, message)?;

        let envelope: PaystackEnvelope = serde_json::from_value(body.clone()).map_err(|e| {
            error!("Failed to parse Paystack response: {}", e);
            kind.into_error(
                ApiFailure::new(format!("Invalid response format: {}", e))
                    .with_status(status_code)
                    .with_provider(Provider::Paystack)
                    .with_raw_response(body.clone()),
            )
        })?;

        if !envelope.status {
            error!("Paystack API error: {}", envelope.message);
            return Err(kind.into_error(
                ApiFailure::new(format!("{}: {}", message, envelope.message))
                    .with_status(status_code)
                    .with_provider(Provider::Paystack)
                    .with_raw_response(body),
            ));
        }

        Ok((envelope.data, body))
    }

    fn subunits_to_amount(&self, data: &Value, pointer: &str) -> PaymentResult<Decimal> {
        let minor = require_decimal(Provider::Paystack, data, pointer)?;
        Ok(scale_from_minor(minor, SUBUNIT_EXPONENT))
    }
}

#[async_trait]
impl PaymentAdapter for PaystackAdapter {
    fn provider(&self) -> Provider {
        Provider::Paystack
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn amount_limits(&self) -> &'static [AmountLimits] {
        AMOUNT_LIMITS
    }

    fn required_customer_fields(&self) -> &'static [CustomerField] {
        &[CustomerField::Email]
    }

    fn validate_credentials(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    async fn get_headers(
        &self,
        authorization: bool,
        _options: &HeaderOptions,
    ) -> PaymentResult<HeaderMap> {
        let mut headers = json_headers();
        if authorization {
            insert_bearer(&mut headers, &self.config.api_key)?;
        }
        Ok(headers)
    }

    fn normalize_status(&self, status: &str) -> TransactionStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => TransactionStatus::Successful,
            "failed" => TransactionStatus::Failed,
            "abandoned" => TransactionStatus::Cancelled,
            "pending" | "queued" => TransactionStatus::Pending,
            "ongoing" | "processing" => TransactionStatus::Processing,
            "reversed" | "processed" => TransactionStatus::Refunded,
            _ => TransactionStatus::Unknown,
        }
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<Value> {
        self.validate_transaction(transaction)?;

        let mut payload = json!({
            "amount": to_minor_units(transaction.amount, transaction.currency)?,
            "email": transaction.customer.email,
            "currency": transaction.currency,
            "reference": transaction
                .reference
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            "metadata": transaction.metadata,
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

    fn validate_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> bool {
        let Some(signature) = header_str(headers, &[SIGNATURE_HEADER]) else {
            return false;
        };
        verify_hex(
            SignatureAlgorithm::HmacSha512,
            self.config.api_key.as_bytes(),
            raw_body,
            signature,
        )
    }

    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> PaymentResult<WebhookEvent> {
        let payload = decode_webhook(self, raw_body, headers)?;
        let data = payload.get("data").cloned().unwrap_or(Value::Null);

        let mut context = serde_json::Map::new();
        if let Some(email) = field_str(&data, "/customer/email") {
            context.insert("customer_email".into(), Value::String(email));
        }
        if let Some(channel) = field_str(&data, "/channel") {
            context.insert("channel".into(), Value::String(channel));
        }

        Ok(WebhookEvent {
            event_type: field_str(&payload, "/event").unwrap_or_else(|| "unknown".to_string()),
            provider: Provider::Paystack,
            transaction_id: require_str(Provider::Paystack, &data, "/reference")?,
            status: self.normalize_status(&field_str(&data, "/status").unwrap_or_default()),
            amount: self.subunits_to_amount(&data, "/amount")?,
            currency: require_currency(Provider::Paystack, &data, "/currency")?,
            created_at: timestamp_at(&data, &["/paid_at", "/paidAt", "/created_at", "/createdAt"])
                .unwrap_or_else(Utc::now),
            metadata: field_object(&data, "/metadata"),
            raw_data: payload,
            context,
        })
    }

    async fn send_payment(&self, transaction: &TransactionDetail) -> PaymentResult<PaymentResponse> {
        let payload = self.format_transaction(transaction)?;

        info!(
            "Initiating Paystack payment: {} {} {}",
            transaction.amount, transaction.currency, transaction.transaction_id
        );

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .post("/transaction/initialize", headers, payload)
            .await?;
        let (data, body) = self.envelope(response, ApiErrorKind::Payment, "Payment request failed")?;

        let reference = field_str(&data, "/reference").or_else(|| transaction.reference.clone());
        info!(
            "Paystack payment initiated successfully: reference={}",
            reference.as_deref().unwrap_or("-")
        );

        let mut metadata = data.as_object().cloned().unwrap_or_default();
        metadata.insert(
            "local_transaction_id".into(),
            Value::String(transaction.transaction_id.clone()),
        );

        // Verification is keyed by the reference Paystack echoes back
        Ok(PaymentResponse {
            transaction_id: reference
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            provider: Provider::Paystack,
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            created_at: Some(Utc::now()),
            expires_at: None,
            reference,
            payment_link: field_str(&data, "/authorization_url"),
            transaction_token: field_str(&data, "/access_code"),
            customer: Some(transaction.customer.clone()),
            raw_response: body,
            metadata,
        })
    }

    async fn check_status(&self, reference: &str) -> PaymentResult<TransactionStatusResponse> {
        info!("Verifying Paystack payment: reference={}", reference);

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .get(&format!("/transaction/verify/{}", reference), headers, &[])
            .await?;
        let kind = if response.status == 404 {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Api
        };
        let (data, _) = self.envelope(response, kind, "Failed to verify Paystack transaction")?;

        let status = self.normalize_status(&field_str(&data, "/status").unwrap_or_default());
        info!(
            "Paystack payment verified: reference={}, status={}",
            reference, status
        );

        Ok(TransactionStatusResponse {
            transaction_id: field_str(&data, "/id").unwrap_or_else(|| reference.to_string()),
            provider: Provider::Paystack,
            status,
            amount: self.subunits_to_amount(&data, "/amount")?,
            data,
        })
    }

    async fn cancel_transaction(&self, _transaction_id: &str) -> PaymentResult<bool> {
        // Post-payment reversals go through refund()
        Err(unsupported(Provider::Paystack, "cancel_transaction"))
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse> {
        info!(
            "Refunding Paystack transaction: id={}, amount={:?}",
            transaction_id, amount
        );

        let mut payload = json!({ "transaction": transaction_id });
        if let Some(amount) = amount {
            ensure_positive(amount)?;
            payload["amount"] = json!(scale_to_minor(amount, SUBUNIT_EXPONENT)?);
        }
        if let Some(reason) = reason {
            payload["merchant_note"] = Value::String(reason.to_string());
        }

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self.api.post("/refund", headers, payload).await?;
        let (data, body) = self.envelope(response, ApiErrorKind::Refund, "Refund failed")?;

        let refunded = match data.get("amount") {
            Some(_) => self.subunits_to_amount(&data, "/amount")?,
            None => amount.ok_or_else(|| missing_field(Provider::Paystack, "/amount", &body))?,
        };

        Ok(PaymentResponse {
            transaction_id: transaction_id.to_string(),
            provider: Provider::Paystack,
            status: self.normalize_status(&field_str(&data, "/status").unwrap_or_default()),
            amount: refunded,
            currency: require_currency(Provider::Paystack, &data, "/currency")?,
            created_at: timestamp_at(&data, &["/createdAt", "/created_at"]),
            expires_at: None,
            reference: field_str(&data, "/transaction/reference")
                .or_else(|| Some(format!("refund-{}", transaction_id))),
            payment_link: None,
            transaction_token: None,
            customer: None,
            raw_response: body,
            metadata: data.as_object().cloned().unwrap_or_default(),
        })
    }

    async fn get_transaction_detail(&self, transaction_id: &str) -> PaymentResult<TransactionDetail> {
        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self
            .api
            .get(&format!("/transaction/{}", transaction_id), headers, &[])
            .await?;
        let kind = if response.status == 404 {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Api
        };
        let (data, _) = self.envelope(
            response,
            kind,
            &format!("Failed to retrieve transaction {}", transaction_id),
        )?;

        let customer = CustomerInfo {
            email: field_str(&data, "/customer/email"),
            first_name: field_str(&data, "/customer/first_name"),
            last_name: field_str(&data, "/customer/last_name"),
            phone_number: field_str(&data, "/customer/phone"),
            id: field_str(&data, "/customer/id"),
            ..Default::default()
        };

        Ok(TransactionDetail {
            transaction_id: field_str(&data, "/id").unwrap_or_else(|| transaction_id.to_string()),
            provider: Provider::Paystack,
            amount: self.subunits_to_amount(&data, "/amount")?,
            currency: require_currency(Provider::Paystack, &data, "/currency")?,
            status: self.normalize_status(&field_str(&data, "/status").unwrap_or_default()),
            transaction_type: TransactionType::Payment,
            created_at: timestamp_at(&data, &["/created_at", "/createdAt"]),
            updated_at: timestamp_at(&data, &["/updated_at", "/updatedAt"]),
            completed_at: timestamp_at(&data, &["/paid_at", "/paidAt"]),
            customer,
            reference: field_str(&data, "/reference"),
            reason: field_str(&data, "/gateway_response"),
            callback_url: None,
            return_url: None,
            metadata: field_object(&data, "/metadata"),
            raw_data: data,
        })
    }
}

impl ProviderAdapter for PaystackAdapter {
    const PROVIDER: Provider = Provider::Paystack;

    fn from_config(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        Self::new(config, transport)
    }
}

// Paystack API response wrapper
#[derive(Debug, Deserialize)]
struct PaystackEnvelope {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::transport::MockTransport;
    use crate::payments::webhook::sign_hex;
    use reqwest::header::HeaderValue;

    const SECRET: &str = "sk_test_test_key";

    fn create_test_provider() -> (PaystackAdapter, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let config = ProviderConfig::new(SECRET).with_callback_url("https://shop.example.com/cb");
        let provider = PaystackAdapter::new(config, transport.clone()).unwrap();
        (provider, transport)
    }

    fn test_transaction(amount: Decimal, currency: Currency) -> TransactionDetail {
        let mut tx = TransactionDetail::new("tx_1", Provider::Paystack, amount, currency);
        tx.customer.email = Some("buyer@example.com".to_string());
        tx.reference = Some("ref_1".to_string());
        tx
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let signature = sign_hex(SignatureAlgorithm::HmacSha512, SECRET.as_bytes(), body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers
    }

    #[test]
    fn test_missing_secret_key_is_configuration_error() {
        let result = PaystackAdapter::new(ProviderConfig::new(""), Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(PaymentError::Configuration(_))));
    }

    #[test]
    fn test_normalize_status_is_total() {
        let (provider, _) = create_test_provider();
        assert_eq!(provider.normalize_status("success"), TransactionStatus::Successful);
        assert_eq!(provider.normalize_status("abandoned"), TransactionStatus::Cancelled);
        assert_eq!(provider.normalize_status("reversed"), TransactionStatus::Refunded);
        assert_eq!(provider.normalize_status("ongoing"), TransactionStatus::Processing);
        assert_eq!(provider.normalize_status("SUCCESS"), TransactionStatus::Successful);
        assert_eq!(provider.normalize_status(""), TransactionStatus::Unknown);
        assert_eq!(provider.normalize_status("teleported"), TransactionStatus::Unknown);
    }

    #[test]
    fn test_amount_range_rejected_for_every_currency() {
        let (provider, _) = create_test_provider();
        for limit in AMOUNT_LIMITS {
            let below = test_transaction(limit.min - dec!(0.01), limit.currency);
            assert!(provider.format_transaction(&below).is_err(), "{} below min", limit.currency);

            let above = test_transaction(limit.max + dec!(0.01), limit.currency);
            assert!(provider.format_transaction(&above).is_err(), "{} above max", limit.currency);

            let at_min = test_transaction(limit.min, limit.currency);
            assert!(provider.format_transaction(&at_min).is_ok(), "{} at min", limit.currency);
        }
    }

    #[test]
    fn test_format_transaction_uses_subunits() {
        let (provider, _) = create_test_provider();
        let payload = provider
            .format_transaction(&test_transaction(dec!(500), Currency::Ngn))
            .unwrap();
        assert_eq!(payload["amount"], json!(50000));
        assert_eq!(payload["email"], json!("buyer@example.com"));
        assert_eq!(payload["reference"], json!("ref_1"));
        assert_eq!(payload["callback_url"], json!("https://shop.example.com/cb"));
    }

    #[test]
    fn test_missing_email_is_rejected() {
        let (provider, _) = create_test_provider();
        let mut tx = test_transaction(dec!(500), Currency::Ngn);
        tx.customer.email = None;
        let err = provider.format_transaction(&tx).unwrap_err();
        assert!(matches!(err, PaymentError::Validation { ref field, .. } if field.as_deref() == Some("email")));
    }

    #[tokio::test]
    async fn test_send_payment_returns_authorization_url() {
        let (provider, transport) = create_test_provider();
        transport.push_response(
            200,
            json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "ref_1"
                }
            }),
        );

        let response = provider
            .send_payment(&test_transaction(dec!(500), Currency::Ngn))
            .await
            .unwrap();
        assert!(response.is_pending());
        assert_eq!(response.transaction_id, "ref_1");
        assert_eq!(response.payment_link.as_deref(), Some("https://checkout.paystack.com/abc"));
        assert_eq!(response.transaction_token.as_deref(), Some("abc"));

        let requests = transport.requests();
        assert_eq!(requests[0].url, "https://api.paystack.co/transaction/initialize");
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            &format!("Bearer {}", SECRET)
        );
    }

    #[tokio::test]
    async fn test_false_envelope_is_payment_error() {
        let (provider, transport) = create_test_provider();
        transport.push_response(200, json!({"status": false, "message": "Invalid key"}));

        let err = provider
            .send_payment(&test_transaction(dec!(500), Currency::Ngn))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Payment(_)));
        assert_eq!(err.status_code(), Some(200));
    }

    #[tokio::test]
    async fn test_check_status_converts_subunits() {
        let (provider, transport) = create_test_provider();
        transport.push_response(
            200,
            json!({
                "status": true,
                "message": "Verification successful",
                "data": {"id": 4099260516_i64, "status": "success", "amount": 10000, "currency": "NGN"}
            }),
        );

        let status = provider.check_status("ref_1").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Successful);
        assert_eq!(status.amount, dec!(100.00));
        assert_eq!(status.transaction_id, "4099260516");
    }

    #[tokio::test]
    async fn test_check_status_not_found() {
        let (provider, transport) = create_test_provider();
        transport.push_response(404, json!({"status": false, "message": "Transaction reference not found"}));

        let err = provider.check_status("missing").await.unwrap_err();
        assert!(matches!(err, PaymentError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported() {
        let (provider, transport) = create_test_provider();
        let err = provider.cancel_transaction("tx_1").await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::UnsupportedOperation { provider: Provider::Paystack, .. }
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refund_sends_subunits() {
        let (provider, transport) = create_test_provider();
        transport.push_response(
            200,
            json!({
                "status": true,
                "message": "Refund has been queued for processing",
                "data": {
                    "transaction": {"id": 1641, "reference": "ref_1"},
                    "amount": 2500,
                    "currency": "NGN",
                    "status": "pending"
                }
            }),
        );

        let refund = provider
            .refund("1641", Some(dec!(25)), Some("duplicate charge"))
            .await
            .unwrap();
        assert_eq!(refund.amount, dec!(25));
        assert_eq!(refund.reference.as_deref(), Some("ref_1"));
        assert_eq!(refund.status, TransactionStatus::Pending);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["amount"], json!(2500));
        assert_eq!(body["merchant_note"], json!("duplicate charge"));
    }

    #[tokio::test]
    async fn test_refund_amount_is_checked_before_request() {
        let (provider, transport) = create_test_provider();
        for amount in [Decimal::MAX, Decimal::ZERO, dec!(-25)] {
            let err = provider.refund("1641", Some(amount), None).await.unwrap_err();
            assert!(
                matches!(err, PaymentError::Validation { ref field, .. } if field.as_deref() == Some("amount")),
                "{} should be rejected",
                amount
            );
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_webhook_signature_validation() {
        let (provider, _) = create_test_provider();
        let body = br#"{"event":"charge.success","data":{"reference":"ref_1","status":"success","amount":10000,"currency":"NGN"}}"#;
        let headers = signed_headers(body);
        assert!(provider.validate_webhook(body, &headers));

        let mut mutated = body.to_vec();
        mutated[10] ^= 0x01;
        assert!(!provider.validate_webhook(&mutated, &headers));
        assert!(!provider.validate_webhook(body, &HeaderMap::new()));
    }

    #[test]
    fn test_webhook_signature_validation_invalid() {
        let (provider, _) = create_test_provider();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("invalid_signature"));
        assert!(!provider.validate_webhook(b"test payload", &headers));
    }

    #[test]
    fn test_parse_webhook() {
        let (provider, _) = create_test_provider();
        let body = br#"{"event":"charge.success","data":{"reference":"ref_1","status":"success","amount":10000,"currency":"NGN","paid_at":"2024-05-01T10:20:30Z","customer":{"email":"buyer@example.com"}}}"#;

        let event = provider.parse_webhook(body, &signed_headers(body)).unwrap();
        assert_eq!(event.event_type, "charge.success");
        assert_eq!(event.transaction_id, "ref_1");
        assert_eq!(event.status, TransactionStatus::Successful);
        assert_eq!(event.amount, dec!(100));
        assert_eq!(event.currency, Currency::Ngn);
        assert_eq!(event.context["customer_email"], json!("buyer@example.com"));
    }

    #[test]
    fn test_parse_webhook_rejects_bad_signature() {
        let (provider, _) = create_test_provider();
        let body = br#"{"event":"charge.success","data":{}}"#;
        let err = provider.parse_webhook(body, &signed_headers(b"other")).unwrap_err();
        assert!(matches!(err, PaymentError::WebhookValidation { .. }));
    }
}
