//! HTTP frontend behavior: status mapping, auth enforcement, and the full
//! account/thread flows end to end against an in-memory store.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use loomline::core::config::Config;
use loomline::server::{AppState, create_router};
use loomline::store::Store;

async fn app() -> (Router, Arc<AppState>) {
    let config = Config::default();
    let store = Store::open_in_memory().await.unwrap();
    let state = AppState::new(config, store);
    (create_router(state.clone()), state)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn signup(router: &Router, email: &str) -> (String, Value) {
    let (status, body) = send(
        router,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": email, "password": "hunter2!", "name": "Tester"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"].clone(),
    )
}

#[tokio::test]
async fn test_healthz_is_public() {
    let (router, _state) = app().await;
    let (status, body) = send(&router, request("GET", "/healthz", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_signup_then_login() {
    let (router, _state) = app().await;
    let (_, user) = signup(&router, "new@example.com").await;
    assert_eq!(user["email"], "new@example.com");
    assert_eq!(user["email_verified"], false);
    assert!(user.get("password_hash").is_none());

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "new@example.com", "password": "hunter2!"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let (router, _state) = app().await;
    signup(&router, "dup@example.com").await;
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "dup@example.com", "password": "other"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_password_is_401() {
    let (router, _state) = app().await;
    signup(&router, "locked@example.com").await;
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "locked@example.com", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown email gets the same answer.
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "ghost@example.com", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_bearer() {
    let (router, _state) = app().await;
    for (method, uri) in [
        ("GET", "/auth/me"),
        ("GET", "/threads"),
        ("POST", "/threads"),
    ] {
        let body = (method == "POST").then(|| json!({}));
        let (status, _) = send(&router, request(method, uri, None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    let (status, _) = send(
        &router,
        request("GET", "/auth/me", Some("not-a-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_fetch_and_update() {
    let (router, _state) = app().await;
    let (token, _) = signup(&router, "me@example.com").await;

    let (status, body) = send(&router, request("GET", "/auth/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Tester");

    let (status, body) = send(
        &router,
        request(
            "PUT",
            "/auth/me",
            Some(&token),
            Some(json!({"avatar_url": "https://cdn/a.png"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Tester");
    assert_eq!(body["avatar_url"], "https://cdn/a.png");
}

#[tokio::test]
async fn test_email_verification_flow() {
    let (router, state) = app().await;
    let (token, user) = signup(&router, "verify@example.com").await;
    let user_id = user["id"].as_str().unwrap().parse().unwrap();

    // Mint a token directly; delivery is out of band.
    let expires = Utc::now() + Duration::hours(24);
    state
        .store
        .create_email_verification_token(user_id, "known-token", expires)
        .await
        .unwrap();

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/verify-email",
            None,
            Some(json!({"token": "known-token"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = send(&router, request("GET", "/auth/me", Some(&token), None)).await;
    assert_eq!(me["email_verified"], true);

    // Resending after verification is a client error.
    let (status, _) = send(
        &router,
        request("POST", "/auth/resend-verification", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/verify-email",
            None,
            Some(json!({"token": "bogus"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forgot_password_never_enumerates() {
    let (router, _state) = app().await;
    signup(&router, "exists@example.com").await;

    let (status_known, body_known) = send(
        &router,
        request(
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({"email": "exists@example.com"})),
        ),
    )
    .await;
    let (status_unknown, body_unknown) = send(
        &router,
        request(
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({"email": "ghost@example.com"})),
        ),
    )
    .await;
    assert_eq!(status_known, StatusCode::OK);
    assert_eq!(status_unknown, StatusCode::OK);
    assert_eq!(body_known, body_unknown);
}

#[tokio::test]
async fn test_password_reset_flow_single_use() {
    let (router, state) = app().await;
    let (_, user) = signup(&router, "reset@example.com").await;
    let user_id = user["id"].as_str().unwrap().parse().unwrap();

    let expires = Utc::now() + Duration::hours(1);
    state
        .store
        .create_password_reset_token(user_id, "reset-me", expires)
        .await
        .unwrap();

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": "reset-me", "new_password": "s3cure!"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password is gone, new one works.
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "reset@example.com", "password": "hunter2!"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "reset@example.com", "password": "s3cure!"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Second consumption fails exactly like an unknown token.
    let (status_reused, body_reused) = send(
        &router,
        request(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": "reset-me", "new_password": "again"})),
        ),
    )
    .await;
    let (status_unknown, body_unknown) = send(
        &router,
        request(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": "never-was", "new_password": "again"})),
        ),
    )
    .await;
    assert_eq!(status_reused, StatusCode::BAD_REQUEST);
    assert_eq!(status_reused, status_unknown);
    assert_eq!(body_reused, body_unknown);
}

#[tokio::test]
async fn test_oauth_sync_is_idempotent() {
    let (router, _state) = app().await;
    let payload = json!({
        "provider": "github",
        "provider_user_id": "gh-42",
        "email": "octo@example.com",
        "name": "Octo",
        "avatar_url": "https://avatars/octo.png"
    });

    let (status, first) = send(
        &router,
        request("POST", "/auth/oauth/sync", None, Some(payload.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user"]["email_verified"], true);

    let (status, second) = send(
        &router,
        request("POST", "/auth/oauth/sync", None, Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user"]["id"], second["user"]["id"]);
}

#[tokio::test]
async fn test_oauth_sync_links_existing_email_account() {
    let (router, _state) = app().await;
    let (_, user) = signup(&router, "linked@example.com").await;

    let (status, synced) = send(
        &router,
        request(
            "POST",
            "/auth/oauth/sync",
            None,
            Some(json!({
                "provider": "google",
                "provider_user_id": "g-7",
                "email": "linked@example.com"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["user"]["id"], user["id"]);
}

#[tokio::test]
async fn test_thread_crud_flow() {
    let (router, _state) = app().await;
    let (token, _) = signup(&router, "threads@example.com").await;

    let (status, thread) = send(
        &router,
        request(
            "POST",
            "/threads",
            Some(&token),
            Some(json!({
                "title": "T1",
                "metadata": {"a": 1, "b": 2},
                "participants": [
                    {"role": "agent", "display_name": "researcher"},
                    {}
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(thread["status"], "open");
    assert_eq!(thread["participants"].as_array().unwrap().len(), 2);
    assert_eq!(thread["participants"][0]["role"], "agent");
    assert_eq!(thread["participants"][1]["role"], "user");
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let participant_id = thread["participants"][0]["id"].as_str().unwrap();
    let (status, message) = send(
        &router,
        request(
            "POST",
            &format!("/threads/{thread_id}/messages"),
            Some(&token),
            Some(json!({
                "content": "hi there",
                "participant_id": participant_id,
                "attachments": [
                    {"kind": "image", "uri": "s3://img/1.png", "content_type": "image/png"},
                    {"kind": "link", "uri": "https://example.com"}
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["kind"], "text");
    assert_eq!(message["attachments"].as_array().unwrap().len(), 2);
    assert_eq!(message["attachments"][0]["kind"], "image");

    let (status, patched) = send(
        &router,
        request(
            "PATCH",
            &format!("/threads/{thread_id}/metadata"),
            Some(&token),
            Some(json!({"b": 3, "c": 4})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["metadata"], json!({"a": 1, "b": 3, "c": 4}));

    let (status, fetched) = send(
        &router,
        request("GET", &format!("/threads/{thread_id}"), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["messages"].as_array().unwrap().len(), 1);
    assert_eq!(fetched["messages"][0]["content"], "hi there");
}

#[tokio::test]
async fn test_thread_listing_and_pagination() {
    let (router, _state) = app().await;
    let (token, _) = signup(&router, "pager@example.com").await;
    for i in 0..5 {
        let (status, _) = send(
            &router,
            request(
                "POST",
                "/threads",
                Some(&token),
                Some(json!({"title": format!("t{i}")})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(
        &router,
        request("GET", "/threads?limit=2&offset=0", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["threads"].as_array().unwrap().len(), 2);
    assert_eq!(page["total"], 5);

    let (_, tail) = send(
        &router,
        request("GET", "/threads?limit=2&offset=4", Some(&token), None),
    )
    .await;
    assert_eq!(tail["threads"].as_array().unwrap().len(), 1);
    assert_eq!(tail["total"], 5);

    // Oversized limits are clamped, not rejected.
    let (status, _) = send(
        &router,
        request("GET", "/threads?limit=10000", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, filtered) = send(
        &router,
        request("GET", "/threads?status=closed", Some(&token), None),
    )
    .await;
    assert_eq!(filtered["total"], 0);
}

#[tokio::test]
async fn test_cross_owner_thread_access_is_404() {
    let (router, _state) = app().await;
    let (token_a, _) = signup(&router, "a@example.com").await;
    let (token_b, _) = signup(&router, "b@example.com").await;

    let (_, thread) = send(
        &router,
        request("POST", "/threads", Some(&token_a), Some(json!({"title": "mine"}))),
    )
    .await;
    let thread_id = thread["id"].as_str().unwrap();

    let (status, _) = send(
        &router,
        request("GET", &format!("/threads/{thread_id}"), Some(&token_b), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        request(
            "POST",
            &format!("/threads/{thread_id}/messages"),
            Some(&token_b),
            Some(json!({"content": "intrusion"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Identical answer for a thread that never existed.
    let ghost = uuid::Uuid::new_v4();
    let (status, _) = send(
        &router,
        request("GET", &format!("/threads/{ghost}"), Some(&token_b), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_enum_value_is_a_client_error() {
    let (router, _state) = app().await;
    let (token, _) = signup(&router, "enum@example.com").await;
    let (status, _) = send(
        &router,
        request(
            "POST",
            "/threads",
            Some(&token),
            Some(json!({"status": "archived"})),
        ),
    )
    .await;
    assert!(status.is_client_error(), "got {status}");
}

#[tokio::test]
async fn test_empty_message_content_is_400() {
    let (router, _state) = app().await;
    let (token, _) = signup(&router, "strict@example.com").await;
    let (_, thread) = send(
        &router,
        request("POST", "/threads", Some(&token), Some(json!({}))),
    )
    .await;
    let thread_id = thread["id"].as_str().unwrap();
    let (status, _) = send(
        &router,
        request(
            "POST",
            &format!("/threads/{thread_id}/messages"),
            Some(&token),
            Some(json!({"content": ""})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
