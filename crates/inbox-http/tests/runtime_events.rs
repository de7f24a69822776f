use std::time::Duration;

use inbox_core::{ClientCommand, ClientEvent, EventStream, MutationKind, PageTicket};
use inbox_http::{RuntimeConfig, spawn_runtime};
use serde_json::json;
use tokio::time::timeout;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

fn config_for(server: &MockServer) -> RuntimeConfig {
    let mut config = RuntimeConfig::new(Url::parse(&server.uri()).expect("mock server uri"));
    config.request_timeout = Duration::from_secs(5);
    config
}

async fn next_event(events: &mut EventStream) -> ClientEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timeout")
        .expect("event receive")
}

async fn mount_directory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "user_id": 7, "full_name": "Alice", "unread_count": 0 }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn refresh_echoes_requested_revision() {
    let server = MockServer::start().await;
    mount_directory(&server).await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();
    handle
        .send(ClientCommand::RefreshDirectory { revision: 4 })
        .await
        .expect("command should enqueue");

    match next_event(&mut events).await {
        ClientEvent::DirectoryUpdated {
            revision,
            conversations,
        } => {
            assert_eq!(revision, 4);
            assert_eq!(conversations[0].display_name(), "Alice");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn successful_mutation_acks_then_refreshes_directory() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/clear-unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();
    handle
        .send(ClientCommand::RefreshDirectory { revision: 9 })
        .await
        .expect("refresh should enqueue");
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::DirectoryUpdated { revision: 9, .. }
    ));

    handle
        .send(ClientCommand::ClearUnread {
            request_id: "clear-1".into(),
            conversation_id: 7,
        })
        .await
        .expect("mutation should enqueue");

    match next_event(&mut events).await {
        ClientEvent::MutationAck(ack) => {
            assert_eq!(ack.request_id, "clear-1");
            assert_eq!(ack.kind, MutationKind::ClearUnread);
            assert!(ack.is_ok());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut events).await {
        ClientEvent::DirectoryUpdated { revision, .. } => assert!(revision > 9),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn lagging_refresh_request_still_outranks_earlier_snapshots() {
    let server = MockServer::start().await;
    mount_directory(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/clear-unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();

    let mut latest = 0;
    for request_id in ["clear-1", "clear-2"] {
        handle
            .send(ClientCommand::ClearUnread {
                request_id: request_id.into(),
                conversation_id: 7,
            })
            .await
            .expect("mutation should enqueue");
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::MutationAck(_)
        ));
        match next_event(&mut events).await {
            ClientEvent::DirectoryUpdated { revision, .. } => {
                assert!(revision > latest);
                latest = revision;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // The session's own counter has not seen the post-mutation snapshots yet.
    handle
        .send(ClientCommand::RefreshDirectory { revision: 1 })
        .await
        .expect("refresh should enqueue");
    match next_event(&mut events).await {
        ClientEvent::DirectoryUpdated { revision, .. } => assert!(revision > latest),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn history_limit_is_capped_and_ticket_echoed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/7"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [],
            "total": 0,
            "has_more": false,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();
    let ticket = PageTicket {
        conversation_id: 7,
        generation: 3,
        offset: 0,
        limit: 500,
    };
    handle
        .send(ClientCommand::FetchHistory { ticket })
        .await
        .expect("fetch should enqueue");

    match next_event(&mut events).await {
        ClientEvent::HistoryPage { ticket: echoed, page } => {
            assert_eq!(echoed, ticket);
            assert!(page.messages.is_empty());
            assert!(!page.has_more);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn failed_history_reports_the_ticket() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/7"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();
    let ticket = PageTicket {
        conversation_id: 7,
        generation: 1,
        offset: 0,
        limit: 30,
    };
    handle
        .send(ClientCommand::FetchHistory { ticket })
        .await
        .expect("fetch should enqueue");

    match next_event(&mut events).await {
        ClientEvent::HistoryFailed { ticket: echoed, error } => {
            assert_eq!(echoed, ticket);
            assert_eq!(error.message, "boom");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn group_info_failure_names_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/group-info/-100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "error", "error": "CHAT_ADMIN_REQUIRED" })),
        )
        .mount(&server)
        .await;

    let handle = spawn_runtime(config_for(&server)).expect("runtime should spawn");
    let mut events = handle.subscribe();
    handle
        .send(ClientCommand::FetchGroupInfo {
            request_id: "info-1".into(),
            chat_id: -100,
        })
        .await
        .expect("query should enqueue");

    match next_event(&mut events).await {
        ClientEvent::RequestFailed {
            request_id,
            operation,
            error,
        } => {
            assert_eq!(request_id.as_deref(), Some("info-1"));
            assert_eq!(operation, "load group info");
            assert_eq!(error.message, "CHAT_ADMIN_REQUIRED");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
