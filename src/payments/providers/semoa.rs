//! Semoa payment provider implementation
//!
//! Order-based hosted checkout. Requests are authorized with a bearer token
//! taken from `token` when configured, otherwise obtained from Semoa's
//! `auth` endpoint on first use and cached.
//!
//! `extra` keys: `username`, `password`, `client_id`, `client_secret`
//! (all required when no `token` is configured), `webhook_secret`.

use crate::config::ProviderConfig;
use crate::error::{ApiErrorKind, ApiFailure, PaymentError, PaymentResult};
use crate::payments::auth::{TokenCache, DEFAULT_TOKEN_TTL};
use crate::payments::money::{decimal_from_json, decimal_to_json, AmountLimits};
use crate::payments::providers::common::{
    decode_webhook, field_object, field_str, insert_bearer, json_headers, missing_field,
    require_currency, require_decimal, timestamp_at, unsupported,
};
use crate::payments::traits::{CustomerField, HeaderOptions, PaymentAdapter, ProviderAdapter};
use crate::payments::transport::{ApiClient, HttpTransport};
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
use tracing::{debug, info};

pub const SANDBOX_URL: &str = "https://sandbox.semoa-payments.com/api";
pub const PRODUCTION_URL: &str = "https://sandbox.semoa-payments.com/api";

const SIGNATURE_HEADER: &str = "x-semoa-signature";

const AMOUNT_LIMITS: &[AmountLimits] = &[
    AmountLimits::new(Currency::Xof, dec!(100), dec!(1000000)),
    AmountLimits::new(Currency::Xaf, dec!(100), dec!(1000000)),
    AmountLimits::new(Currency::Eur, dec!(1), dec!(10000)),
    AmountLimits::new(Currency::Usd, dec!(1), dec!(10000)),
];

/// How requests get their bearer token
enum SemoaAuth {
    Static(String),
    Login {
        username: String,
        password: String,
        client_id: String,
        client_secret: String,
    },
}

/// Semoa payment provider
pub struct SemoaAdapter {
    config: ProviderConfig,
    auth: SemoaAuth,
    webhook_secret: Option<String>,
    tokens: TokenCache,
    api: ApiClient,
}

impl SemoaAdapter {
    pub fn new(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        let credentials = ApiCredentials::from_config(&config);

        let auth = match credentials.token.filter(|token| !token.trim().is_empty()) {
            Some(token) => SemoaAuth::Static(token),
            None => match (
                credentials.username,
                credentials.password,
                credentials.client_id,
                credentials.client_secret,
            ) {
                (Some(username), Some(password), Some(client_id), Some(client_secret)) => {
                    SemoaAuth::Login {
                        username,
                        password,
                        client_id,
                        client_secret,
                    }
                }
                _ => {
                    return Err(PaymentError::configuration(
                        "Semoa requires a token, or extra.username, extra.password, \
                         extra.client_id and extra.client_secret",
                    ))
                }
            },
        };

        let api = ApiClient::new(
            Provider::Semoa,
            config.resolve_base_url(SANDBOX_URL, PRODUCTION_URL),
            config.timeout(),
            transport,
        );
        Ok(Self {
            webhook_secret: credentials.webhook_secret.or(credentials.api_secret),
            config,
            auth,
            tokens: TokenCache::new(),
            api,
        })
    }

    async fn access_token(&self) -> PaymentResult<String> {
        match &self.auth {
            SemoaAuth::Static(token) => Ok(token.clone()),
            SemoaAuth::Login { .. } => self.tokens.get_or_refresh(|| self.authenticate()).await,
        }
    }

    async fn authenticate(&self) -> PaymentResult<(String, Duration)> {
        let SemoaAuth::Login {
            username,
            password,
            client_id,
            client_secret,
        } = &self.auth
        else {
            return Err(PaymentError::configuration("Semoa login credentials are not configured"));
        };

        debug!("Authenticating with Semoa");
        let payload = json!({
            "username": username,
            "password": password,
            "client_id": client_id,
            "client_secret": client_secret,
        });
        let response = self.api.post("auth", json_headers(), payload).await?;
        let body = self
            .api
            .ensure_success(response, ApiErrorKind::Authentication, "Authentication failed")?;

        let token = field_str(&body, "/access_token").ok_or_else(|| {
            PaymentError::Authentication(
                ApiFailure::new("Authentication response has no access_token")
                    .with_provider(Provider::Semoa)
                    .with_raw_response(body.clone()),
            )
        })?;
        let ttl = body
            .get("expires_in")
            .and_then(decimal_from_json)
            .and_then(|secs| secs.to_u64())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        info!("Semoa authentication succeeded");
        Ok((token, ttl))
    }

    async fn fetch_order(&self, order_id: &str) -> PaymentResult<Value> {
        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self.api.get(&format!("orders/{}", order_id), headers, &[]).await?;
        let kind = if response.status == 404 {
            ApiErrorKind::NotFound
        } else {
            ApiErrorKind::Api
        };
        self.api
            .ensure_success(response, kind, &format!("Failed to retrieve Semoa order {}", order_id))
    }
}

/// Order number, under either spelling Semoa uses
fn order_number(order: &Value) -> Option<String> {
    field_str(order, "/orderNum").or_else(|| field_str(order, "/order_num"))
}

#[async_trait]
impl PaymentAdapter for SemoaAdapter {
    fn provider(&self) -> Provider {
        Provider::Semoa
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
        match &self.auth {
            SemoaAuth::Static(token) => !token.trim().is_empty(),
            SemoaAuth::Login {
                username,
                password,
                client_id,
                client_secret,
            } => [username, password, client_id, client_secret]
                .iter()
                .all(|value| !value.trim().is_empty()),
        }
    }

    async fn get_headers(
        &self,
        authorization: bool,
        _options: &HeaderOptions,
    ) -> PaymentResult<HeaderMap> {
        let mut headers = json_headers();
        if authorization {
            let token = self.access_token().await?;
            insert_bearer(&mut headers, &token)?;
        }
        Ok(headers)
    }

    fn normalize_status(&self, status: &str) -> TransactionStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "paid" | "success" | "succeeded" => TransactionStatus::Successful,
            "canceled" => TransactionStatus::Cancelled,
            "failure" => TransactionStatus::Failed,
            "in_progress" => TransactionStatus::Processing,
            other => TransactionStatus::from_canonical(other),
        }
    }

    fn format_transaction(&self, transaction: &TransactionDetail) -> PaymentResult<Value> {
        self.validate_transaction(transaction)?;

        let customer = &transaction.customer;
        let phone: String = customer
            .phone_number
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut client = json!({ "phone": phone });
        if let Some(first_name) = &customer.first_name {
            client["first_name"] = Value::String(first_name.clone());
        }
        if let Some(last_name) = &customer.last_name {
            client["last_name"] = Value::String(last_name.clone());
        }

        let mut payload = json!({
            "amount": decimal_to_json(transaction.amount),
            "currency": transaction.currency,
            "description": transaction
                .reason
                .clone()
                .unwrap_or_else(|| format!("Payment {}", transaction.transaction_id)),
            "merchant_reference": transaction
                .reference
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            "client": client,
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
        let Some(secret) = self.webhook_secret.as_deref() else {
            return false;
        };
        let Some(signature) = header_str(headers, &[SIGNATURE_HEADER]) else {
            return false;
        };
        verify_hex(SignatureAlgorithm::HmacSha256, secret.as_bytes(), raw_body, signature)
    }

    fn parse_webhook(&self, raw_body: &[u8], headers: &HeaderMap) -> PaymentResult<WebhookEvent> {
        let payload = decode_webhook(self, raw_body, headers)?;
        let order = match payload.get("data") {
            Some(data) if data.is_object() => data.clone(),
            _ => payload.clone(),
        };

        let mut context = Metadata::new();
        if let Some(phone) = field_str(&order, "/client/phone") {
            context.insert("phone".into(), Value::String(phone));
        }
        if let Some(reference) = field_str(&order, "/merchant_reference") {
            context.insert("merchant_reference".into(), Value::String(reference));
        }

        Ok(WebhookEvent {
            event_type: field_str(&payload, "/event").unwrap_or_else(|| "order.updated".to_string()),
            provider: Provider::Semoa,
            transaction_id: order_number(&order)
                .ok_or_else(|| missing_field(Provider::Semoa, "orderNum", &payload))?,
            status: self.normalize_status(&field_str(&order, "/status").unwrap_or_default()),
            amount: require_decimal(Provider::Semoa, &order, "/amount")?,
            currency: require_currency(Provider::Semoa, &order, "/currency")?,
            created_at: timestamp_at(&order, &["/created_at", "/updated_at"]).unwrap_or_else(Utc::now),
            metadata: field_object(&order, "/metadata"),
            raw_data: payload,
            context,
        })
    }

    async fn send_payment(&self, transaction: &TransactionDetail) -> PaymentResult<PaymentResponse> {
        let order = self.format_transaction(transaction)?;

        info!(
            "Creating Semoa order: {} {} {}",
            transaction.amount, transaction.currency, transaction.transaction_id
        );

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self.api.post("orders", headers, order).await?;
        let body = self
            .api
            .ensure_success(response, ApiErrorKind::Payment, "Payment request failed")?;

        let order_num = order_number(&body);
        info!(
            "Semoa order created: order_num={}",
            order_num.as_deref().unwrap_or("-")
        );

        let mut metadata = transaction.metadata.clone();
        metadata.insert(
            "local_transaction_id".into(),
            Value::String(transaction.transaction_id.clone()),
        );
        if let Some(order_num) = &order_num {
            metadata.insert("order_num".into(), Value::String(order_num.clone()));
        }

        // Status checks and cancellation address the order by its number
        Ok(PaymentResponse {
            transaction_id: order_num
                .clone()
                .unwrap_or_else(|| transaction.transaction_id.clone()),
            provider: Provider::Semoa,
            status: TransactionStatus::Pending,
            amount: transaction.amount,
            currency: transaction.currency,
            created_at: timestamp_at(&body, &["/created_at"]).or_else(|| Some(Utc::now())),
            expires_at: timestamp_at(&body, &["/expires_at"]),
            reference: transaction
                .reference
                .clone()
                .or_else(|| field_str(&body, "/merchant_reference"))
                .or_else(|| field_str(&body, "/reference")),
            payment_link: field_str(&body, "/bill_url"),
            transaction_token: order_num,
            customer: Some(transaction.customer.clone()),
            raw_response: body,
            metadata,
        })
    }

    async fn check_status(&self, order_id: &str) -> PaymentResult<TransactionStatusResponse> {
        info!("Checking Semoa order: {}", order_id);
        let order = self.fetch_order(order_id).await?;

        Ok(TransactionStatusResponse {
            transaction_id: order_number(&order).unwrap_or_else(|| order_id.to_string()),
            provider: Provider::Semoa,
            status: self.normalize_status(&field_str(&order, "/status").unwrap_or_default()),
            amount: require_decimal(Provider::Semoa, &order, "/amount")?,
            data: order,
        })
    }

    async fn cancel_transaction(&self, order_id: &str) -> PaymentResult<bool> {
        info!("Cancelling Semoa order: {}", order_id);

        let headers = self.get_headers(true, &HeaderOptions::new()).await?;
        let response = self.api.delete(&format!("orders/{}", order_id), headers).await?;
        self.api.ensure_success(
            response,
            ApiErrorKind::Cancellation,
            "Failed to cancel Semoa order",
        )?;
        Ok(true)
    }

    async fn refund(
        &self,
        _transaction_id: &str,
        _amount: Option<Decimal>,
        _reason: Option<&str>,
    ) -> PaymentResult<PaymentResponse> {
        Err(unsupported(Provider::Semoa, "refund"))
    }

    async fn get_transaction_detail(&self, order_id: &str) -> PaymentResult<TransactionDetail> {
        let order = self.fetch_order(order_id).await?;

        let customer = CustomerInfo {
            phone_number: field_str(&order, "/client/phone"),
            first_name: field_str(&order, "/client/first_name"),
            last_name: field_str(&order, "/client/last_name"),
            email: field_str(&order, "/client/email"),
            ..Default::default()
        };

        Ok(TransactionDetail {
            transaction_id: order_number(&order).unwrap_or_else(|| order_id.to_string()),
            provider: Provider::Semoa,
            amount: require_decimal(Provider::Semoa, &order, "/amount")?,
            currency: require_currency(Provider::Semoa, &order, "/currency")?,
            status: self.normalize_status(&field_str(&order, "/status").unwrap_or_default()),
            transaction_type: TransactionType::Payment,
            created_at: timestamp_at(&order, &["/created_at"]),
            updated_at: timestamp_at(&order, &["/updated_at"]),
            completed_at: timestamp_at(&order, &["/paid_at"]),
            customer,
            reference: field_str(&order, "/merchant_reference").or_else(|| field_str(&order, "/reference")),
            reason: field_str(&order, "/description"),
            callback_url: field_str(&order, "/callback_url"),
            return_url: None,
            metadata: field_object(&order, "/metadata"),
            raw_data: order,
        })
    }
}

impl ProviderAdapter for SemoaAdapter {
    const PROVIDER: Provider = Provider::Semoa;

    fn from_config(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> PaymentResult<Self> {
        Self::new(config, transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::transport::MockTransport;
    use crate::payments::webhook::sign_hex;
    use reqwest::header::HeaderValue;

    fn login_config() -> ProviderConfig {
        ProviderConfig::new("semoa_key")
            .with_extra("username", "merchant")
            .with_extra("password", "p4ss")
            .with_extra("client_id", "cid")
            .with_extra("client_secret", "csecret")
            .with_extra("webhook_secret", "semoa_wh")
    }

    fn create_test_provider() -> (SemoaAdapter, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let mut config = login_config();
        config.token = Some("static_token".to_string());
        let provider = SemoaAdapter::new(config, transport.clone()).unwrap();
        (provider, transport)
    }

    fn test_transaction(amount: Decimal, currency: Currency) -> TransactionDetail {
        let mut tx = TransactionDetail::new("tx_1", Provider::Semoa, amount, currency);
        tx.customer = CustomerInfo::with_phone("+228 90 11 22 33");
        tx
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let config = ProviderConfig::new("key").with_extra("username", "merchant");
        let result = SemoaAdapter::new(config, Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(PaymentError::Configuration(_))));
    }

    #[test]
    fn test_normalize_status_is_total() {
        let (provider, _) = create_test_provider();
        assert_eq!(provider.normalize_status("paid"), TransactionStatus::Successful);
        assert_eq!(provider.normalize_status("canceled"), TransactionStatus::Cancelled);
        assert_eq!(provider.normalize_status("expired"), TransactionStatus::Expired);
        assert_eq!(provider.normalize_status("Pending"), TransactionStatus::Pending);
        for status in TransactionStatus::ALL {
            assert_eq!(provider.normalize_status(status.as_str()), status);
        }
        assert_eq!(provider.normalize_status("on_hold"), TransactionStatus::Unknown);
    }

    #[test]
    fn test_amount_range_rejected_for_every_currency() {
        let (provider, _) = create_test_provider();
        for limit in AMOUNT_LIMITS {
            let below = test_transaction(limit.min - dec!(1), limit.currency);
            assert!(provider.format_transaction(&below).is_err(), "{} below min", limit.currency);

            let above = test_transaction(limit.max + dec!(1), limit.currency);
            assert!(provider.format_transaction(&above).is_err(), "{} above max", limit.currency);
        }
    }

    #[test]
    fn test_format_transaction() {
        let (provider, _) = create_test_provider();
        let payload = provider
            .format_transaction(&test_transaction(dec!(2500), Currency::Xof))
            .unwrap();
        assert_eq!(payload["amount"], json!(2500));
        assert_eq!(payload["currency"], json!("XOF"));
        assert_eq!(payload["client"]["phone"], json!("+22890112233"));
        assert!(payload["client"].get("first_name").is_none());
    }

    #[tokio::test]
    async fn test_send_payment_with_static_token() {
        let (provider, transport) = create_test_provider();
        transport.push_response(
            201,
            json!({"orderNum": "ORD-77", "bill_url": "https://pay.semoa.com/ORD-77", "reference": "SEM-1"}),
        );

        let response = provider
            .send_payment(&test_transaction(dec!(2500), Currency::Xof))
            .await
            .unwrap();
        assert!(response.is_pending());
        assert_eq!(response.transaction_id, "ORD-77");
        assert_eq!(response.transaction_token.as_deref(), Some("ORD-77"));
        assert_eq!(response.reference.as_deref(), Some("SEM-1"));
        assert_eq!(response.payment_link.as_deref(), Some("https://pay.semoa.com/ORD-77"));
        assert_eq!(response.metadata["order_num"], json!("ORD-77"));
        assert_eq!(response.metadata["local_transaction_id"], json!("tx_1"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://sandbox.semoa-payments.com/api/orders");
        assert_eq!(requests[0].headers.get("authorization").unwrap(), "Bearer static_token");
    }

    #[tokio::test]
    async fn test_sent_order_number_addresses_status_check() {
        let (provider, transport) = create_test_provider();
        transport.push_response(201, json!({"order_num": "ord_1", "bill_url": "https://pay.semoa.com/ord_1"}));
        transport.push_response(200, json!({"order_num": "ord_1", "status": "paid", "amount": 2500}));

        let mut transaction = test_transaction(dec!(2500), Currency::Xof);
        transaction.reference = Some("cart-9".to_string());
        let response = provider.send_payment(&transaction).await.unwrap();
        assert_eq!(response.transaction_id, "ord_1");
        assert_eq!(response.reference.as_deref(), Some("cart-9"));

        let status = provider.check_status(&response.transaction_id).await.unwrap();
        assert_eq!(status.status, TransactionStatus::Successful);
        assert!(transport.requests()[1].url.ends_with("orders/ord_1"));
    }

    #[tokio::test]
    async fn test_login_happens_once() {
        let transport = Arc::new(MockTransport::new());
        let provider = SemoaAdapter::new(login_config(), transport.clone()).unwrap();
        transport.push_response(200, json!({"access_token": "jwt_1"}));
        transport.push_response(200, json!({"orderNum": "ORD-77", "status": "paid", "amount": 2500}));
        transport.push_response(200, json!({"orderNum": "ORD-77", "status": "paid", "amount": 2500}));

        let first = provider.check_status("ORD-77").await.unwrap();
        assert_eq!(first.status, TransactionStatus::Successful);
        provider.check_status("ORD-77").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, "https://sandbox.semoa-payments.com/api/auth");
        assert_eq!(requests[0].body.as_ref().unwrap()["username"], json!("merchant"));
        assert_eq!(requests[2].headers.get("authorization").unwrap(), "Bearer jwt_1");
    }

    #[tokio::test]
    async fn test_failed_login_is_authentication_error() {
        let transport = Arc::new(MockTransport::new());
        let provider = SemoaAdapter::new(login_config(), transport.clone()).unwrap();
        transport.push_response(401, json!({"message": "bad credentials"}));

        let err = provider.check_status("ORD-77").await.unwrap_err();
        assert!(matches!(err, PaymentError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_cancel_transaction() {
        let (provider, transport) = create_test_provider();
        transport.push_response(204, json!({}));

        assert!(provider.cancel_transaction("ORD-77").await.unwrap());
        let request = &transport.requests()[0];
        assert_eq!(request.method, reqwest::Method::DELETE);
        assert_eq!(request.url, "https://sandbox.semoa-payments.com/api/orders/ORD-77");
    }

    #[tokio::test]
    async fn test_refund_is_unsupported() {
        let (provider, transport) = create_test_provider();
        let err = provider.refund("ORD-77", None, None).await.unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedOperation { provider: Provider::Semoa, .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_webhook_round_trip() {
        let (provider, _) = create_test_provider();
        let body = br#"{"event":"order.paid","orderNum":"ORD-77","status":"paid","amount":2500,"currency":"XOF"}"#;
        let signature = sign_hex(SignatureAlgorithm::HmacSha256, b"semoa_wh", body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());

        let event = provider.parse_webhook(body, &headers).unwrap();
        assert_eq!(event.event_type, "order.paid");
        assert_eq!(event.transaction_id, "ORD-77");
        assert_eq!(event.status, TransactionStatus::Successful);
        assert_eq!(event.currency, Currency::Xof);

        let mut mutated = body.to_vec();
        mutated[20] ^= 0x01;
        assert!(!provider.validate_webhook(&mutated, &headers));
        assert!(provider.parse_webhook(&mutated, &headers).is_err());
    }
}
