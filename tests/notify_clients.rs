use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clinic_booking::notify::{
    FcmPushClient, HttpMessageGateway, MessageGateway, NotificationError, PushSender,
};

#[tokio::test]
async fn gateway_posts_phone_and_message() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send/message"))
        .and(body_json(json!({
            "phone": "+201234567890",
            "message": "Your verification code is: 123456"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = HttpMessageGateway::new(format!("{}/", mock_server.uri()));
    gateway
        .send("+201234567890", "Your verification code is: 123456")
        .await
        .expect("gateway accepted the message");
}

#[tokio::test]
async fn gateway_error_status_is_reported() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send/message"))
        .respond_with(ResponseTemplate::new(500).set_body_string("session not ready"))
        .mount(&mock_server)
        .await;

    let gateway = HttpMessageGateway::new(mock_server.uri());
    let err = gateway.send("+201234567890", "hello").await.unwrap_err();

    match err {
        NotificationError::Rejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "session not ready");
        }
        other => panic!("Expected Rejected error, got {other:?}"),
    }
}

#[tokio::test]
async fn push_sends_one_message_per_device_with_bearer_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/clinic-app/messages:send"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "message": { "notification": { "title": "Appointment Cancelled" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/clinic-app/messages/1"
        })))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = FcmPushClient::with_base_url(mock_server.uri(), "clinic-app", "test-token");
    let tokens = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    client
        .send(&tokens, "Appointment Cancelled", "body")
        .await
        .expect("all deliveries succeed");
}

#[tokio::test]
async fn push_reports_partial_delivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/clinic-app/messages:send"))
        .and(body_partial_json(json!({ "message": { "token": "stale" } })))
        .respond_with(ResponseTemplate::new(404).set_body_string("UNREGISTERED"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/clinic-app/messages:send"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = FcmPushClient::with_base_url(mock_server.uri(), "clinic-app", "test-token");
    let tokens = vec!["fresh".to_string(), "stale".to_string()];
    let err = client.send(&tokens, "title", "body").await.unwrap_err();

    match err {
        NotificationError::PartialDelivery { failed, total } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
        }
        other => panic!("Expected PartialDelivery error, got {other:?}"),
    }
}

#[tokio::test]
async fn single_device_failure_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/clinic-app/messages:send"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = FcmPushClient::with_base_url(mock_server.uri(), "clinic-app", "expired");
    let err = client
        .send(&["only".to_string()], "title", "body")
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::Rejected { status: 401, .. }));
}
