// End-to-end flows through PaymentSwitch with a mocked transport

use payswitch::config::{ProviderConfig, RootConfig};
use payswitch::error::PaymentError;
use payswitch::payments::registry::AdapterRegistry;
use payswitch::payments::traits::PaymentAdapter;
use payswitch::payments::transport::{HttpTransport, MockTransport};
use payswitch::payments::types::TransactionDetail;
use payswitch::payments::webhook::{sign_hex, SignatureAlgorithm};
use payswitch::{
    Currency, CustomerInfo, PaymentRequest, PaymentSwitch, Provider, TransactionStatus,
};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

fn provider_config(provider: Provider) -> ProviderConfig {
    match provider {
        Provider::Paystack => ProviderConfig::new("k1"),
        Provider::Fedapay => ProviderConfig::new("k1")
            .with_extra("public_key", "pk_sandbox")
            .with_extra("secret_key", "sk_sandbox"),
        Provider::AirtelMoney => ProviderConfig::new("k1")
            .with_extra("client_id", "client")
            .with_extra("client_secret", "secret")
            .with_extra("country", "NG")
            .with_extra("currency", "NGN"),
        Provider::Semoa => {
            let mut config = ProviderConfig::new("k1");
            config.token = Some("semoa_token".to_string());
            config
        }
    }
}

fn single_provider(provider: Provider) -> (PaymentSwitch, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let config = RootConfig::default().with_provider(provider, provider_config(provider));
    let switch = PaymentSwitch::builder(config)
        .transport(transport.clone())
        .build()
        .unwrap();
    (switch, transport)
}

#[tokio::test]
async fn test_airtel_send_payment_is_pending() {
    let (switch, transport) = single_provider(Provider::AirtelMoney);
    transport.push_response(200, json!({"access_token": "tok", "expires_in": 3600}));
    transport.push_response(
        200,
        json!({
            "data": {"transaction": {"id": "airtel_tx", "status": "Success."}},
            "status": {"code": "200", "message": "SUCCESS", "success": true}
        }),
    );

    let response = switch
        .send_payment(
            None,
            PaymentRequest::new(dec!(500), "+2348012345678").with_currency(Currency::Ngn),
        )
        .await
        .unwrap();

    assert_eq!(response.provider, Provider::AirtelMoney);
    assert_eq!(response.status, TransactionStatus::Pending);
    assert!(response.is_pending());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_semoa_send_then_check_uses_order_number() {
    let (switch, transport) = single_provider(Provider::Semoa);
    transport.push_response(
        201,
        json!({"order_num": "ord_1", "bill_url": "https://pay.semoa.com/ord_1", "status": "pending"}),
    );
    transport.push_response(
        200,
        json!({"order_num": "ord_1", "status": "paid", "amount": 2500, "currency": "XOF"}),
    );

    let sent = switch
        .send_payment(
            None,
            PaymentRequest::new(dec!(2500), "+22890112233")
                .with_currency(Currency::Xof)
                .with_reference("cart-9"),
        )
        .await
        .unwrap();
    assert_eq!(sent.transaction_id, "ord_1");
    assert_eq!(sent.reference.as_deref(), Some("cart-9"));

    let status = switch.check_status(None, &sent.transaction_id).await.unwrap();
    assert_eq!(status, TransactionStatus::Successful);
    assert!(transport.requests()[1].url.ends_with("orders/ord_1"));
}

#[tokio::test]
async fn test_fedapay_send_then_check_uses_provider_id() {
    let (switch, transport) = single_provider(Provider::Fedapay);
    transport.push_response(
        200,
        json!({"v1/transaction": {"id": 104, "reference": "trx_abc", "status": "pending", "amount": 1500}}),
    );
    transport.push_response(200, json!({"token": "tok_1", "url": "https://process.fedapay.com/tok_1"}));
    transport.push_response(
        200,
        json!({"v1/transaction": {"id": 104, "status": "approved", "amount": 1500}}),
    );

    let customer = CustomerInfo {
        first_name: Some("Ada".to_string()),
        ..Default::default()
    };
    let sent = switch
        .send_payment(
            None,
            PaymentRequest::new(dec!(1500), "+22997000000")
                .with_currency(Currency::Xof)
                .with_customer(customer),
        )
        .await
        .unwrap();
    assert_eq!(sent.transaction_id, "104");

    let status = switch.check_status(None, &sent.transaction_id).await.unwrap();
    assert_eq!(status, TransactionStatus::Successful);
    assert!(transport.requests()[2].url.ends_with("/v1/transactions/104"));
}

#[tokio::test]
async fn test_oversized_refund_is_validation_error() {
    let (switch, transport) = single_provider(Provider::Paystack);

    let err = switch
        .refund(None, "1", Some(Decimal::MAX), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Validation { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_below_minimum_fails_before_any_request() {
    let (switch, transport) = single_provider(Provider::AirtelMoney);

    let err = switch
        .send_payment(
            None,
            PaymentRequest::new(dec!(10), "+2348012345678").with_currency(Currency::Ngn),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Validation { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_rate_limited_status_check() {
    let (switch, transport) = single_provider(Provider::Paystack);
    transport.push_response(429, json!({"status": false, "message": "Too many requests"}));

    let err = switch.check_status(None, "ref_1").await.unwrap_err();

    assert!(matches!(err, PaymentError::RateLimit(_)));
    assert_eq!(err.code(), "rate_limit_exceeded");
    assert_eq!(err.status_code(), Some(429));
    assert_eq!(err.provider(), Some(Provider::Paystack));
    assert_eq!(
        err.raw_response().unwrap()["message"],
        json!("Too many requests")
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_paystack_subunits_become_major_units() {
    let (switch, transport) = single_provider(Provider::Paystack);
    transport.push_response(
        200,
        json!({
            "status": true,
            "message": "Verification successful",
            "data": {"id": 4099, "reference": "ref_1", "status": "success", "amount": 10000, "currency": "NGN"}
        }),
    );
    transport.push_response(
        200,
        json!({
            "status": true,
            "message": "Refund has been queued for processing",
            "data": {"transaction": {"reference": "ref_1"}, "amount": 10000, "currency": "NGN", "status": "pending"}
        }),
    );

    let status = switch.check_status_detail(None, "ref_1").await.unwrap();
    assert_eq!(status.status, TransactionStatus::Successful);
    assert_eq!(status.amount, dec!(100.00));

    let refund = switch
        .refund(None, "4099", Some(dec!(100)), Some("customer request"))
        .await
        .unwrap();
    assert_eq!(refund.amount, dec!(100));
    assert_eq!(refund.currency, Currency::Ngn);

    let body = transport.requests()[1].body.clone().unwrap();
    assert_eq!(body["amount"], json!(10000));
}

#[tokio::test]
async fn test_concurrent_calls_share_one_switch() {
    let (switch, transport) = single_provider(Provider::Paystack);
    for _ in 0..2 {
        transport.push_response(
            200,
            json!({
                "status": true,
                "message": "Verification successful",
                "data": {"reference": "ref", "status": "pending", "amount": 5000, "currency": "NGN"}
            }),
        );
    }

    let (first, second) = tokio::join!(
        switch.check_status(None, "ref_a"),
        switch.check_status(None, "ref_b")
    );
    assert_eq!(first.unwrap(), TransactionStatus::Pending);
    assert_eq!(second.unwrap(), TransactionStatus::Pending);
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_webhook_round_trip_through_switch() {
    let (switch, _) = single_provider(Provider::Paystack);
    let body = br#"{"event":"charge.success","data":{"reference":"ref_9","status":"success","amount":250000,"currency":"NGN","customer":{"email":"ada@example.com"}}}"#;

    let mut headers = HeaderMap::new();
    let signature = sign_hex(SignatureAlgorithm::HmacSha512, b"k1", body);
    headers.insert("x-paystack-signature", HeaderValue::from_str(&signature).unwrap());

    assert!(switch.validate_webhook(Provider::Paystack, body, &headers).unwrap());
    let event = switch.parse_webhook(Provider::Paystack, body, &headers).unwrap();
    assert_eq!(event.transaction_id, "ref_9");
    assert_eq!(event.amount, dec!(2500));
    assert_eq!(event.status, TransactionStatus::Successful);

    let mut mutated = body.to_vec();
    mutated[10] ^= 0x01;
    assert!(!switch.validate_webhook(Provider::Paystack, &mutated, &headers).unwrap());
    assert!(switch.parse_webhook(Provider::Paystack, &mutated, &headers).is_err());
}

#[test]
fn test_every_declared_range_is_enforced() {
    let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());
    let customer = CustomerInfo {
        phone_number: Some("+2348012345678".to_string()),
        email: Some("ada@example.com".to_string()),
        country: Some("NG".to_string()),
        ..Default::default()
    };

    for provider in Provider::ALL {
        let adapter = AdapterRegistry::global()
            .build(provider, provider_config(provider), transport.clone())
            .unwrap();

        for limits in adapter.amount_limits() {
            let transaction = |amount: Decimal| {
                let mut tx = TransactionDetail::new("tx", provider, amount, limits.currency);
                tx.customer = customer.clone();
                tx
            };

            assert!(
                adapter.validate_transaction(&transaction(limits.min)).is_ok(),
                "{} {} minimum should pass",
                provider,
                limits.currency
            );
            for amount in [limits.min / dec!(2), limits.max * dec!(2)] {
                let err = adapter.validate_transaction(&transaction(amount)).unwrap_err();
                assert!(
                    matches!(err, PaymentError::Validation { .. }),
                    "{} {} {} should be rejected",
                    provider,
                    limits.currency,
                    amount
                );
            }
        }
    }
}

#[test]
fn test_status_normalization_is_total() {
    let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());
    for provider in Provider::ALL {
        let adapter = AdapterRegistry::global()
            .build(provider, provider_config(provider), transport.clone())
            .unwrap();
        for raw in ["", "???", "SUCCESS", "ts", "paid", "garbage-status"] {
            let status = adapter.normalize_status(raw);
            assert!(TransactionStatus::ALL.contains(&status));
        }
        assert_eq!(adapter.normalize_status("no-such-status"), TransactionStatus::Unknown);
    }
}

#[test]
fn test_config_from_value_builds_switch() {
    let config = RootConfig::from_value(json!({
        "environment": "sandbox",
        "default_currency": "NGN",
        "default_provider": "PAYSTACK",
        "providers": {
            "SEMOA": {"api_key": "k1", "token": "t"},
            "PAYSTACK": {"api_key": "k2"}
        }
    }))
    .unwrap();

    let switch = PaymentSwitch::builder(config)
        .transport(Arc::new(MockTransport::new()))
        .build()
        .unwrap();
    assert_eq!(switch.providers(), vec![Provider::Semoa, Provider::Paystack]);
    assert_eq!(switch.default_provider(), Provider::Paystack);
    assert_eq!(switch.default_currency(), Currency::Ngn);
}
