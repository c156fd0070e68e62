// ReqwestTransport against a local HTTP server

use payswitch::config::ProviderConfig;
use payswitch::error::PaymentError;
use payswitch::payments::providers::PaystackAdapter;
use payswitch::payments::traits::PaymentAdapter;
use payswitch::payments::transport::{ApiClient, HttpTransport, ReqwestTransport};
use payswitch::{Provider, TransactionStatus};
use reqwest::header::HeaderMap;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, timeout: Duration) -> ApiClient {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new().unwrap());
    ApiClient::new(Provider::Paystack, server.uri(), timeout, transport)
}

#[tokio::test]
async fn test_json_response_with_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/42"))
        .and(query_param("expand", "customer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "status": "paid"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server, Duration::from_secs(5));
    let response = api
        .get("/orders/42", HeaderMap::new(), &[("expand", "customer")])
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.json()["status"], json!("paid"));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(json!({"amount": 500})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let api = client_for(&server, Duration::from_secs(5));
    let response = api
        .post("orders", HeaderMap::new(), json!({"amount": 500}))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .mount(&server)
        .await;

    let api = client_for(&server, Duration::from_secs(5));
    let err = api.get("/anything", HeaderMap::new(), &[]).await.unwrap_err();

    assert!(matches!(err, PaymentError::RateLimit(_)));
    assert_eq!(err.status_code(), Some(429));
    assert_eq!(err.raw_response().unwrap()["message"], json!("slow down"));
}

#[tokio::test]
async fn test_non_json_body_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let api = client_for(&server, Duration::from_secs(5));
    let response = api.get("/", HeaderMap::new(), &[]).await.unwrap();

    assert_eq!(response.status, 502);
    assert_eq!(response.body, json!({"raw_response": "<html>Bad Gateway</html>"}));
}

#[tokio::test]
async fn test_slow_response_is_network_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let api = client_for(&server, Duration::from_millis(200));
    let err = api.get("/slow", HeaderMap::new(), &[]).await.unwrap_err();

    assert_eq!(err.code(), "network_timeout");
    assert_eq!(err.provider(), Some(Provider::Paystack));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_paystack_adapter_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/ref_1"))
        .and(header("authorization", "Bearer sk_live_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {"reference": "ref_1", "status": "success", "amount": 10000, "currency": "NGN"}
        })))
        .mount(&server)
        .await;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new().unwrap());
    let config = ProviderConfig::new("sk_live_key").with_base_url(server.uri());
    let adapter = PaystackAdapter::new(config, transport).unwrap();

    let status = adapter.check_status("ref_1").await.unwrap();
    assert_eq!(status.status, TransactionStatus::Successful);
    assert_eq!(status.amount, dec!(100));
}
