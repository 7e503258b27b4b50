//! SlackClient against a mock Web API.

mod common;

use serde_json::json;
use widget::config::Config;
use widget::platform::{PlatformClient, PlatformError, SlackClient};
use widget::{Bot, Incoming};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn auth_test_returns_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .and(header("authorization", "Bearer xoxb-test"))
        .respond_with(ok(json!({
            "ok": true,
            "url": "https://acme.slack.com/",
            "team": "Acme",
            "user": "widget",
            "team_id": "T1",
            "user_id": "UBOT",
            "bot_id": "BBOT"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-test", Some(server.uri()));
    let identity = client.auth_test().await.unwrap();
    assert_eq!(identity.user_id, "UBOT");
    assert_eq!(identity.team, "Acme");
    assert_eq!(identity.bot_id.as_deref(), Some("BBOT"));
}

#[tokio::test]
async fn auth_test_invalid_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ok(json!({ "ok": false, "error": "invalid_auth" })))
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-bad", Some(server.uri()));
    let err = client.auth_test().await.unwrap_err();
    assert!(matches!(err, PlatformError::Auth(ref m) if m.contains("invalid_auth")));
}

#[tokio::test]
async fn users_info_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U1"))
        .respond_with(ok(json!({
            "ok": true,
            "user": { "id": "U1", "name": "alice", "real_name": "Alice Liddell", "is_bot": false, "deleted": false }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", "U404"))
        .respond_with(ok(json!({ "ok": false, "error": "user_not_found" })))
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-test", Some(server.uri()));
    let user = client.user_info("U1").await.unwrap();
    assert_eq!(user.name, "alice");
    assert_eq!(user.real_name.as_deref(), Some("Alice Liddell"));
    assert!(client.user_info("U404").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn conversations_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .and(query_param("channel", "C1"))
        .respond_with(ok(json!({
            "ok": true,
            "channel": { "id": "C1", "name": "general", "is_private": false, "is_member": true }
        })))
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-test", Some(server.uri()));
    let channel = client.channel_info("C1").await.unwrap();
    assert_eq!(channel.name, "general");
    assert!(channel.is_member);
}

#[tokio::test]
async fn post_message_sends_channel_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .and(body_json(json!({ "channel": "C1", "text": "Yes, hello." })))
        .respond_with(ok(json!({ "ok": true, "channel": "C1", "ts": "1.1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-test", Some(server.uri()));
    client.post_message("C1", "Yes, hello.").await.unwrap();
}

#[tokio::test]
async fn http_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = SlackClient::with_base_url("xoxb-test", Some(server.uri()));
    let err = client.post_message("C1", "hi").await.unwrap_err();
    assert!(matches!(err, PlatformError::Api(ref m) if m.contains("500")));
}

#[tokio::test]
async fn connect_from_config_authenticates_then_listens() {
    if std::env::var_os("LISTEN_URL").is_some() || std::env::var_os("SLACK_SIGNING_SECRET").is_some() {
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth.test"))
        .respond_with(ok(json!({ "ok": true, "user_id": "UBOT", "user": "widget" })))
        .expect(1)
        .mount(&server)
        .await;

    let url = common::endpoint(common::free_port());
    let mut config = Config::default();
    config.slack.bot_token = Some("xoxb-test".into());
    config.slack.api_base_url = Some(server.uri());
    config.listener.url = url.clone();
    config.listener.allow_unverified = true;

    let (bot, mut events) = Bot::connect(&config).await.unwrap();
    assert_eq!(bot.user_id(), "UBOT");
    common::wait_ready(&url).await;

    bot.stop().await;
    assert!(matches!(events.recv().await, Some(Incoming::Stopped(_))));
}
