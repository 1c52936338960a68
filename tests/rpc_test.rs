//! Binary RPC frontend behavior over a real TCP loopback, including
//! cross-adapter equivalence against the HTTP frontend.

use std::sync::Arc;

use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

use loomline::core::config::Config;
use loomline::core::entities::{NewMessage, NewThread};
use loomline::core::kinds::{MessageKind, ThreadStatus};
use loomline::rpc::wire::{
    self, Envelope, MessageSpec, Reply, Request, Response, ThreadQuery, ThreadSpec,
};
use loomline::rpc::{read_frame, serve_listener, write_frame};
use loomline::server::AppState;
use loomline::store::Store;

struct Harness {
    state: Arc<AppState>,
    stream: TcpStream,
}

async fn harness() -> Harness {
    let config = Config::default();
    let store = Store::open_in_memory().await.unwrap();
    let state = AppState::new(config, store);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_listener(
        Arc::clone(&state),
        listener,
        std::future::pending(),
    ));
    let stream = TcpStream::connect(addr).await.unwrap();
    Harness { state, stream }
}

impl Harness {
    async fn call(&mut self, token: Option<&str>, request: Request) -> Response {
        self.send(token, request).await;
        self.next_frame().await
    }

    async fn send(&mut self, token: Option<&str>, request: Request) {
        let envelope = Envelope {
            version: wire::PROTOCOL_VERSION,
            token: token.map(str::to_string),
            request,
        };
        let bytes = bincode::serialize(&envelope).unwrap();
        write_frame(&mut self.stream, &bytes).await.unwrap();
    }

    async fn next_frame(&mut self) -> Response {
        let bytes = read_frame(&mut self.stream).await.unwrap().unwrap();
        bincode::deserialize(&bytes).unwrap()
    }

    async fn signup(&mut self, email: &str) -> (String, String) {
        let response = self
            .call(
                None,
                Request::Signup {
                    email: email.to_string(),
                    password: "hunter2!".to_string(),
                    name: Some("Tester".to_string()),
                },
            )
            .await;
        match response {
            Response::Ok(Reply::Token(grant)) => (grant.access_token, grant.user.id),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}

fn expect_error(response: &Response, code: u8) {
    match response {
        Response::Error { code: got, .. } => assert_eq!(*got, code),
        other => panic!("expected error code {code}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let mut h = harness().await;
    let response = h.call(None, Request::Health).await;
    match response {
        Response::Ok(Reply::Health { status, .. }) => assert_eq!(status, "ok"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_signup_login_and_profile() {
    let mut h = harness().await;
    let (token, user_id) = h.signup("rpc@example.com").await;

    let response = h
        .call(
            None,
            Request::Login {
                email: "rpc@example.com".to_string(),
                password: "hunter2!".to_string(),
            },
        )
        .await;
    assert!(matches!(response, Response::Ok(Reply::Token(_))));

    let response = h.call(Some(&token), Request::GetProfile).await;
    match response {
        Response::Ok(Reply::User(user)) => assert_eq!(user.id, user_id),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_protected_calls_require_token() {
    let mut h = harness().await;
    let response = h.call(None, Request::GetProfile).await;
    expect_error(&response, wire::error_code::UNAUTHENTICATED);

    let response = h
        .call(Some("garbage"), Request::ListThreads(ThreadQuery::default()))
        .await;
    expect_error(&response, wire::error_code::UNAUTHENTICATED);
}

#[tokio::test]
async fn test_thread_lifecycle_over_rpc() {
    let mut h = harness().await;
    let (token, _) = h.signup("threads-rpc@example.com").await;

    let response = h
        .call(
            Some(&token),
            Request::CreateThread(ThreadSpec {
                title: Some("T1".to_string()),
                status: 0, // unspecified → open
                metadata_json: r#"{"a": 1}"#.to_string(),
                participants: vec![],
                ..ThreadSpec::default()
            }),
        )
        .await;
    let thread = match response {
        Response::Ok(Reply::Thread(thread)) => thread,
        other => panic!("unexpected response: {other:?}"),
    };
    assert_eq!(thread.status, wire::thread_status_code(ThreadStatus::Open));

    let response = h
        .call(
            Some(&token),
            Request::AppendMessage {
                thread_id: thread.id.clone(),
                message: MessageSpec {
                    kind: 0, // unspecified → text
                    content: "hello rpc".to_string(),
                    ..MessageSpec::default()
                },
            },
        )
        .await;
    let message = match response {
        Response::Ok(Reply::Message(message)) => message,
        other => panic!("unexpected response: {other:?}"),
    };
    assert_eq!(message.kind, wire::message_kind_code(MessageKind::Text));

    let response = h
        .call(
            Some(&token),
            Request::UpdateThreadMetadata {
                thread_id: thread.id.clone(),
                patch_json: r#"{"b": 2}"#.to_string(),
            },
        )
        .await;
    let patched = match response {
        Response::Ok(Reply::Thread(thread)) => thread,
        other => panic!("unexpected response: {other:?}"),
    };
    let merged: serde_json::Value = serde_json::from_str(&patched.metadata_json).unwrap();
    assert_eq!(merged, json!({"a": 1, "b": 2}));

    let response = h
        .call(Some(&token), Request::ListThreads(ThreadQuery::default()))
        .await;
    match response {
        Response::Ok(Reply::ThreadPage { threads, total }) => {
            assert_eq!(total, 1);
            assert_eq!(threads.len(), 1);
            assert_eq!(threads[0].messages.len(), 1);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_thread_messages() {
    let mut h = harness().await;
    let (token, _) = h.signup("stream@example.com").await;

    let response = h
        .call(Some(&token), Request::CreateThread(ThreadSpec::default()))
        .await;
    let thread_id = match response {
        Response::Ok(Reply::Thread(thread)) => thread.id,
        other => panic!("unexpected response: {other:?}"),
    };
    for i in 0..3 {
        let response = h
            .call(
                Some(&token),
                Request::AppendMessage {
                    thread_id: thread_id.clone(),
                    message: MessageSpec {
                        content: format!("m{i}"),
                        ..MessageSpec::default()
                    },
                },
            )
            .await;
        assert!(matches!(response, Response::Ok(Reply::Message(_))));
    }

    h.send(
        Some(&token),
        Request::StreamThreadMessages {
            thread_id: thread_id.clone(),
        },
    )
    .await;
    let mut contents = Vec::new();
    loop {
        match h.next_frame().await {
            Response::StreamItem(message) => contents.push(message.content),
            Response::StreamEnd => break,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(contents, vec!["m0", "m1", "m2"]);

    // Streaming an unknown thread yields a single error frame.
    let response = h
        .call(
            Some(&token),
            Request::StreamThreadMessages {
                thread_id: uuid::Uuid::new_v4().to_string(),
            },
        )
        .await;
    expect_error(&response, wire::error_code::NOT_FOUND);
}

#[tokio::test]
async fn test_out_of_table_enum_code_is_rejected() {
    let mut h = harness().await;
    let (token, _) = h.signup("codes@example.com").await;
    let response = h
        .call(
            Some(&token),
            Request::CreateThread(ThreadSpec {
                status: 99,
                ..ThreadSpec::default()
            }),
        )
        .await;
    expect_error(&response, wire::error_code::INVALID_ARGUMENT);
}

#[tokio::test]
async fn test_wrong_protocol_version_is_rejected() {
    let mut h = harness().await;
    let envelope = Envelope {
        version: wire::PROTOCOL_VERSION + 1,
        token: None,
        request: Request::Health,
    };
    let bytes = bincode::serialize(&envelope).unwrap();
    write_frame(&mut h.stream, &bytes).await.unwrap();
    let response = h.next_frame().await;
    expect_error(&response, wire::error_code::INVALID_ARGUMENT);
}

#[tokio::test]
async fn test_cross_owner_is_not_found_over_rpc() {
    let mut h = harness().await;
    let (token_a, _) = h.signup("a-rpc@example.com").await;
    let (token_b, _) = h.signup("b-rpc@example.com").await;

    let response = h
        .call(Some(&token_a), Request::CreateThread(ThreadSpec::default()))
        .await;
    let thread_id = match response {
        Response::Ok(Reply::Thread(thread)) => thread.id,
        other => panic!("unexpected response: {other:?}"),
    };

    let response = h
        .call(
            Some(&token_b),
            Request::GetThread {
                thread_id: thread_id.clone(),
            },
        )
        .await;
    expect_error(&response, wire::error_code::NOT_FOUND);
}

#[tokio::test]
async fn test_adapters_report_the_same_domain_state() {
    // One store, both frontends: a thread written through the repository is
    // visible with identical content through the RPC projection and the
    // domain read the HTTP frontend serializes.
    let mut h = harness().await;
    let (token, user_id) = h.signup("equiv@example.com").await;
    let owner = user_id.parse().unwrap();

    let created = h
        .state
        .store
        .create_thread(
            owner,
            NewThread {
                title: Some("shared".to_string()),
                ..NewThread::default()
            },
        )
        .await
        .unwrap();
    h.state
        .store
        .append_message(
            owner,
            created.id,
            NewMessage {
                content: "one truth".to_string(),
                ..NewMessage::default()
            },
        )
        .await
        .unwrap();

    let domain = h.state.store.get_thread(owner, created.id).await.unwrap();

    let response = h
        .call(
            Some(&token),
            Request::GetThread {
                thread_id: created.id.to_string(),
            },
        )
        .await;
    let over_rpc = match response {
        Response::Ok(Reply::Thread(thread)) => thread,
        other => panic!("unexpected response: {other:?}"),
    };

    assert_eq!(over_rpc.id, domain.id.to_string());
    assert_eq!(over_rpc.title.as_deref(), Some("shared"));
    assert_eq!(over_rpc.messages.len(), domain.messages.len());
    assert_eq!(over_rpc.messages[0].content, domain.messages[0].content);
    assert_eq!(
        over_rpc.messages[0].id,
        domain.messages[0].id.to_string()
    );
    assert_eq!(
        over_rpc.created_at_ms,
        domain.created_at.timestamp_millis()
    );
}
