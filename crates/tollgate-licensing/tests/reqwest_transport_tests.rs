//! Reqwest transport against a mock attestation backend.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{Error, HttpRequest, HttpTransport};
use tollgate_licensing::{
    BindingOptions, License, LicenseManager, LicenseState, RemoteAttestorConfig,
    RemoteLicenseAttestor, ReqwestTransport,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_post_sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/attest"))
        .and(header("content-type", "application/json"))
        .and(header("x-api-key", "secret"))
        .and(body_partial_json(json!({"license": {"key": "lic-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": true})))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = std::collections::BTreeMap::new();
    headers.insert("X-Api-Key".to_string(), "secret".to_string());
    let request = HttpRequest::post_json(
        format!("{}/v1/attest", server.uri()),
        json!({"license": {"key": "lic-1"}}).to_string(),
    )
    .with_headers(&headers);

    let response = ReqwestTransport::new().post(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.body, r#"{"valid":true}"#);
}

#[tokio::test]
async fn test_error_status_is_returned_as_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let request = HttpRequest::post_json(server.uri(), "{}".to_string());
    let response = ReqwestTransport::new().post(request).await.unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(response.body, "maintenance");
}

#[tokio::test]
async fn test_timeout_maps_to_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let request = HttpRequest::post_json(server.uri(), "{}".to_string())
        .with_timeout(Some(Duration::from_millis(50)));
    let err = ReqwestTransport::new().post(request).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_connection_failure_is_network_error() {
    let request = HttpRequest::post_json("http://127.0.0.1:9/attest", "{}".to_string());
    let err = ReqwestTransport::new().post(request).await.unwrap_err();
    assert_eq!(err.code(), "NETWORK_ERROR");
}

#[tokio::test]
async fn test_manager_validates_against_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/attest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "nextCheckInMs": 60000
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/revocation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"revoked": false})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/entitlements"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"entitlements": ["vision-kit"]})),
        )
        .mount(&server)
        .await;

    let manager = Arc::new(LicenseManager::new());
    manager
        .set_license(License::new("lic-1").with_features(["core"]))
        .unwrap();
    let attestor = RemoteLicenseAttestor::new(RemoteAttestorConfig::with_base_url(&format!(
        "{}/v1",
        server.uri()
    )));

    manager
        .attach_attestor(Arc::new(attestor.clone()), BindingOptions::default())
        .await
        .unwrap();

    assert_eq!(manager.status().state, LicenseState::Valid);
    assert!(manager.has_feature("vision-kit"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    manager.detach_attestor();
}
