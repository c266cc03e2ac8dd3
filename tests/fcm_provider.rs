//! FCM provider tests against a mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ara_push_service::notification::Payload;
use ara_push_service::provider::{
    FcmProvider, ProviderError, PushMessage, PushProvider, ServiceAccountKey,
};

const SEND_PATH: &str = "/v1/projects/demo/messages:send";
const TEST_KEY_PEM: &str = include_str!("fixtures/test_service_account_key.pem");

fn message(token: &str) -> PushMessage {
    let mut data = Payload::new();
    data.insert("order_id".to_string(), json!("A-1001"));
    data.insert("count".to_string(), json!(42));
    PushMessage {
        token: token.to_string(),
        title: "Order shipped".to_string(),
        body: "Your order is on its way".to_string(),
        data,
    }
}

fn static_provider(server: &MockServer) -> FcmProvider {
    FcmProvider::with_static_token(&server.uri(), "demo", "static-token", Duration::from_secs(5))
        .unwrap()
}

fn fcm_error(code: u16, status: &str, error_code: Option<&str>, message: &str) -> ResponseTemplate {
    let details = match error_code {
        Some(error_code) => json!([{
            "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
            "errorCode": error_code
        }]),
        None => json!([]),
    };
    ResponseTemplate::new(code).set_body_json(json!({
        "error": {
            "code": code,
            "message": message,
            "status": status,
            "details": details
        }
    }))
}

#[tokio::test]
async fn test_send_with_static_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer static-token"))
        .and(body_partial_json(json!({
            "message": {
                "token": "device-1",
                "notification": {
                    "title": "Order shipped",
                    "body": "Your order is on its way"
                },
                "data": {"order_id": "A-1001", "count": "42"}
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "projects/demo/messages/0:1234"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let receipt = static_provider(&server)
        .deliver(&message("device-1"))
        .await
        .unwrap();
    assert_eq!(receipt, "projects/demo/messages/0:1234");
}

#[tokio::test]
async fn test_unregistered_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(fcm_error(
            404,
            "NOT_FOUND",
            Some("UNREGISTERED"),
            "Requested entity was not found.",
        ))
        .mount(&server)
        .await;

    let err = static_provider(&server)
        .deliver(&message("stale"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Unregistered("Requested entity was not found.".to_string())
    );
}

#[tokio::test]
async fn test_invalid_argument() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(fcm_error(
            400,
            "INVALID_ARGUMENT",
            Some("INVALID_ARGUMENT"),
            "The registration token is not a valid FCM registration token",
        ))
        .mount(&server)
        .await;

    let err = static_provider(&server)
        .deliver(&message("garbled"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_other_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({"message": {"token": "quota"}})))
        .respond_with(fcm_error(
            429,
            "RESOURCE_EXHAUSTED",
            Some("QUOTA_EXCEEDED"),
            "Sending limit exceeded",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({"message": {"token": "proxy"}})))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let provider = static_provider(&server);

    let err = provider.deliver(&message("quota")).await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::Other("QUOTA_EXCEEDED: Sending limit exceeded".to_string())
    );

    let err = provider.deliver(&message("proxy")).await.unwrap_err();
    assert_eq!(err, ProviderError::Other("HTTP 502: Bad Gateway".to_string()));
}

#[tokio::test]
async fn test_transport_error_is_other() {
    let provider =
        FcmProvider::with_static_token("http://127.0.0.1:1", "demo", "t", Duration::from_secs(1))
            .unwrap();

    let err = provider.deliver(&message("device-1")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Other(ref detail) if detail.starts_with("transport error")));
}

#[tokio::test]
async fn test_service_account_token_is_exchanged_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-access-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer sa-access-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "projects/demo/messages/1"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let key = ServiceAccountKey {
        project_id: Some("demo".to_string()),
        client_email: "push@demo.iam.gserviceaccount.com".to_string(),
        private_key: TEST_KEY_PEM.to_string(),
        token_uri: format!("{}/token", server.uri()),
    };
    let provider =
        FcmProvider::with_service_account(&server.uri(), "demo", key, Duration::from_secs(5))
            .unwrap();

    provider.deliver(&message("device-1")).await.unwrap();
    provider.deliver(&message("device-2")).await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_exchange_is_other() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let key = ServiceAccountKey {
        project_id: None,
        client_email: "push@demo.iam.gserviceaccount.com".to_string(),
        private_key: TEST_KEY_PEM.to_string(),
        token_uri: format!("{}/token", server.uri()),
    };
    let provider =
        FcmProvider::with_service_account(&server.uri(), "demo", key, Duration::from_secs(5))
            .unwrap();

    let err = provider.deliver(&message("device-1")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Other(ref detail) if detail.contains("HTTP 401")));
}

#[test]
fn test_bad_private_key_is_rejected() {
    let key = ServiceAccountKey {
        project_id: None,
        client_email: "push@demo.iam.gserviceaccount.com".to_string(),
        private_key: "not a key".to_string(),
        token_uri: "http://localhost/token".to_string(),
    };
    assert!(FcmProvider::with_service_account("http://localhost", "demo", key, Duration::from_secs(1)).is_err());
}
