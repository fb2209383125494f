#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fenix_api::{
    CloudClient, DeviceCommand, DeviceCommandSink, Error, TokenListener, TokenState,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

const USERNAME: &str = "user@example.com";

fn discovery_body(server_uri: &str) -> serde_json::Value {
    json!({
        "endpoints": {
            "RestApi": {
                "generics": { "https": format!("{server_uri}/generics") },
                "device":   { "https": format!("{server_uri}/device") },
                "data":     { "https": format!("{server_uri}/data") },
            }
        }
    })
}

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
        .mount(server)
        .await;
}

fn token_body(id_token: &str) -> serde_json::Value {
    json!({
        "idToken": id_token,
        "accessToken": "access-1",
        "refreshToken": "refresh-1",
        "expiresIn": 3600,
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/generics/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-1")))
        .mount(server)
        .await;
}

fn new_client(server: &MockServer) -> CloudClient {
    let discovery_url = Url::parse(&format!("{}/endpoints", server.uri())).unwrap();
    let password: secrecy::SecretString = "hunter2".to_string().into();
    CloudClient::new(USERNAME, password, discovery_url, &TransportConfig::default()).unwrap()
}

/// Tokens issued long enough ago that the refresh window has passed.
fn expired_tokens(refresh_token: Option<&str>) -> TokenState {
    let obtained_at = Utc::now() - Duration::seconds(7200);
    TokenState {
        id_token: "stale-token".into(),
        access_token: Some("stale-access".into()),
        refresh_token: refresh_token.map(str::to_owned),
        expires_at: Some(obtained_at + Duration::seconds(3600)),
        obtained_at,
    }
}

fn fresh_tokens() -> TokenState {
    let obtained_at = Utc::now();
    TokenState {
        id_token: "seeded-token".into(),
        access_token: None,
        refresh_token: Some("seeded-refresh".into()),
        expires_at: Some(obtained_at + Duration::seconds(3600)),
        obtained_at,
    }
}

#[derive(Default)]
struct RecordingListener {
    changes: Mutex<Vec<TokenState>>,
}

impl TokenListener for RecordingListener {
    fn on_tokens_changed(&self, tokens: &TokenState) {
        self.changes.lock().unwrap().push(tokens.clone());
    }
}

// ── Endpoint discovery ──────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_direct_document() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    let client = new_client(&server);
    let endpoints = client.endpoints().await.unwrap();

    assert_eq!(endpoints.generics.as_str(), format!("{}/generics", server.uri()));
    assert_eq!(endpoints.device.as_str(), format!("{}/device", server.uri()));
    assert_eq!(endpoints.data.as_str(), format!("{}/data", server.uri()));
}

#[tokio::test]
async fn test_resolve_environment_wrapped_document() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "endpoints": {
                "RestApi": {
                    "prod": {
                        "generics": { "https": format!("{uri}/generics") },
                        "device":   { "https": format!("{uri}/device") },
                        "data":     { "https": format!("{uri}/data") },
                    }
                }
            }
        })))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let endpoints = client.endpoints().await.unwrap();

    assert_eq!(endpoints.device.as_str(), format!("{uri}/device"));
}

#[tokio::test]
async fn test_missing_service_is_configuration_error() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "endpoints": {
                "RestApi": {
                    "generics": { "https": format!("{uri}/generics") },
                    "device":   { "https": format!("{uri}/device") },
                }
            }
        })))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let result = client.endpoints().await;

    assert!(
        matches!(result, Err(Error::Configuration { .. })),
        "expected Configuration error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_discovery_http_error_is_configuration_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let result = client.endpoints().await;

    assert!(matches!(result, Err(Error::Configuration { .. })));
}

#[tokio::test]
async fn test_endpoint_set_is_cached_after_first_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
        .expect(1)
        .mount(&server)
        .await;

    let client = new_client(&server);
    client.endpoints().await.unwrap();
    client.endpoints().await.unwrap();
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_rejected_is_auth_error() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let client = new_client(&server);
    let result = client.list_devices().await;

    assert!(
        matches!(result, Err(Error::Auth { status: Some(401), .. })),
        "expected Auth error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_notifies_listener_with_full_snapshot() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    let listener = Arc::new(RecordingListener::default());
    let client = new_client(&server)
        .with_listener(Arc::clone(&listener) as Arc<dyn TokenListener>);

    client.list_devices().await.unwrap();

    let changes = listener.changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].id_token, "token-1");
    assert_eq!(changes[0].refresh_token.as_deref(), Some("refresh-1"));
    assert!(changes[0].expires_at.is_some());
}

#[tokio::test]
async fn test_seeded_valid_tokens_skip_login() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    // No auth mock mounted: any login attempt would 404 and fail the call.

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    let client = new_client(&server).with_tokens(fresh_tokens());
    client.list_devices().await.unwrap();
}

#[tokio::test]
async fn test_refresh_preserves_refresh_token_when_response_omits_it() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .and(body_partial_json(json!({
            "refreshToken": "refresh-0",
            "username": USERNAME,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "token-2",
            "accessToken": "access-2",
            "expiresIn": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    let client = new_client(&server).with_tokens(expired_tokens(Some("refresh-0")));
    client.list_devices().await.unwrap();

    let tokens = client.tokens().await.unwrap();
    assert_eq!(tokens.id_token, "token-2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-0"));
}

#[tokio::test]
async fn test_rejected_refresh_falls_back_to_login() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_string("refresh expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-3")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    let client = new_client(&server).with_tokens(expired_tokens(Some("refresh-0")));
    client.list_devices().await.unwrap();

    assert_eq!(client.tokens().await.unwrap().id_token, "token-3");
}

#[tokio::test]
async fn test_fresh_login_clears_refresh_token_when_response_lacks_one() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;

    // Refresh is rejected, forcing a fresh login whose response carries
    // no refresh token.
    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "token-4",
            "expiresIn": 3600,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    let client = new_client(&server).with_tokens(expired_tokens(Some("refresh-0")));
    client.list_devices().await.unwrap();

    let tokens = client.tokens().await.unwrap();
    assert_eq!(tokens.id_token, "token-4");
    assert_eq!(tokens.refresh_token, None);
}

// ── REST primitive ──────────────────────────────────────────────────

#[tokio::test]
async fn test_call_retries_once_after_unauthorized() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    // Forced refresh on the retry path.
    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-2")))
        .expect(1)
        .mount(&server)
        .await;

    // First attempt 401, second attempt succeeds.
    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "devices": [{ "id": "sauna-1", "type": "xenio" }] })),
        )
        .mount(&server)
        .await;

    let body = new_client(&server).list_devices().await.unwrap();
    assert_eq!(body["devices"][0]["id"], "sauna-1");
}

#[tokio::test]
async fn test_unauthorized_after_retry_is_auth_error() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-2")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still expired"))
        .mount(&server)
        .await;

    let result = new_client(&server).list_devices().await;

    assert!(
        matches!(result, Err(Error::Auth { status: Some(401), .. })),
        "expected Auth error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_api_error_carries_status_and_body() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/device/devices/state"))
        .and(query_param("deviceId", "sauna-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .mount(&server)
        .await;

    let result = new_client(&server).device_state("sauna-1").await;

    match result {
        Err(Error::Api { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal failure");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_success_body_parses_as_empty_object() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/data/data/latest-data"))
        .and(query_param("deviceId", "sauna-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let body = new_client(&server).latest_data("sauna-1").await.unwrap();
    assert_eq!(body, json!({}));
}

// ── Command dispatch ────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatch_falls_through_candidates() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    // Both POST shapes rejected, the PUT fallback accepted.
    Mock::given(method("POST"))
        .and(path("/device/devices/target"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/device/devices/state"))
        .and(body_partial_json(json!({
            "deviceId": "sauna-1",
            "state": { "activeProfile": 2 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = new_client(&server);
    let cmd = DeviceCommand::set_active_profile("sauna-1", 2);
    client.dispatch(&cmd).await.unwrap();
}

#[tokio::test]
async fn test_dispatch_first_candidate_sends_flat_payload() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/device/devices/target"))
        .and(body_partial_json(json!({
            "deviceId": "sauna-1",
            "targetTemp": 85.0,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = new_client(&server);
    let cmd = DeviceCommand::set_target_temperature("sauna-1", 85.0);
    client.dispatch(&cmd).await.unwrap();
}

#[tokio::test]
async fn test_dispatch_aborts_on_auth_failure() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/generics/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("token-2")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/device/devices/target"))
        .respond_with(ResponseTemplate::new(401).set_body_string("not yours"))
        .mount(&server)
        .await;

    // The PUT fallback must never run once auth has failed.
    Mock::given(method("PUT"))
        .and(path("/device/devices/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = new_client(&server);
    let result = client.dispatch(&DeviceCommand::power("sauna-1", true)).await;

    assert!(matches!(result, Err(Error::Auth { .. })));
}
