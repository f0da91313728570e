//! Integration tests for the Discord destination client using wiremock

use bytes::Bytes;
use feedrelay::notifications::channels::discord::DiscordConfig;
use feedrelay::notifications::{
    Attachment, ChannelError, Destination, DestinationClient, DiscordClient, Embed, RenderedMessage,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> DiscordClient {
    DiscordClient::new(DiscordConfig::new(server.uri(), "bot-token")).unwrap()
}

fn message(attachments: Vec<Attachment>) -> RenderedMessage {
    RenderedMessage {
        text: "https://www.instagram.com/p/B8x/".to_string(),
        embed: Embed {
            title: Some("New Post".to_string()),
            color: Some(0xffffff),
            ..Default::default()
        },
        attachments,
    }
}

fn destination() -> Destination {
    Destination {
        community_id: "guild-1".to_string(),
        channel_id: "555".to_string(),
    }
}

#[tokio::test]
async fn test_resolve_destination_in_community() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/555"))
        .and(header("authorization", "Bot bot-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "555", "guild_id": "guild-1", "type": 0 })),
        )
        .mount(&server)
        .await;

    let resolved = client(&server)
        .resolve_destination("guild-1", "555")
        .await
        .unwrap();
    assert_eq!(resolved, Some(destination()));
}

#[tokio::test]
async fn test_resolve_destination_other_community() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/555"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "555", "guild_id": "guild-2" })),
        )
        .mount(&server)
        .await;

    let resolved = client(&server)
        .resolve_destination("guild-1", "555")
        .await
        .unwrap();
    assert_eq!(resolved, None);
}

#[tokio::test]
async fn test_resolve_deleted_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/555"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Unknown Channel", "code": 10003 })),
        )
        .mount(&server)
        .await;

    let resolved = client(&server)
        .resolve_destination("guild-1", "555")
        .await
        .unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_deliver_json_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/555/messages"))
        .and(header("authorization", "Bot bot-token"))
        .and(body_partial_json(json!({
            "content": "https://www.instagram.com/p/B8x/ <@&77>",
            "embeds": [{ "title": "New Post", "color": 0xffffff }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
        .expect(1)
        .mount(&server)
        .await;

    let message = message(Vec::new());
    client(&server)
        .deliver(&destination(), &message.text_with_mention(Some("77")), &message)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deliver_with_attachment_uses_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/555/messages"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
        .expect(1)
        .mount(&server)
        .await;

    let message = message(vec![Attachment {
        filename: "B8x-media-collage.png".to_string(),
        content_type: "image/png".to_string(),
        data: Bytes::from_static(b"\x89PNG"),
    }]);
    client(&server)
        .deliver(&destination(), &message.text, &message)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"payload_json\""));
    assert!(body.contains("name=\"files[0]\""));
    assert!(body.contains("B8x-media-collage.png"));
}

#[tokio::test]
async fn test_deliver_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/555/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 1.5 })))
        .mount(&server)
        .await;

    let message = message(Vec::new());
    let result = client(&server)
        .deliver(&destination(), &message.text, &message)
        .await;

    match result {
        Err(e @ ChannelError::RateLimited(_)) => assert!(e.is_recoverable()),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_deliver_forbidden_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/555/messages"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Missing Permissions"))
        .mount(&server)
        .await;

    let message = message(Vec::new());
    let result = client(&server)
        .deliver(&destination(), &message.text, &message)
        .await;

    assert!(matches!(
        result,
        Err(ChannelError::Rejected { status: 403, .. })
    ));
}
