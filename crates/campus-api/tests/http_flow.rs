use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use campus_api::auth::{AppState, AppStateInner, issue_token};
use campus_db::Database;
use campus_types::models::Role;

const CRON_SECRET: &str = "cron-test-secret";
const JWT_SECRET: &str = "jwt-test-secret";

fn app() -> (Router, AppState) {
    let db = Database::open_in_memory().unwrap();
    let state: AppState = Arc::new(AppStateInner::new(db, JWT_SECRET, CRON_SECRET));
    (campus_api::router(state.clone()), state)
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

/// Register a student and return (id, token).
async fn register(app: &Router, name: &str) -> (Uuid, String) {
    let email = format!("{}@campus.test", name.to_lowercase());
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["userId"].as_str().unwrap().parse().unwrap();
    (id, body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_register_login_me() {
    let (app, _) = app();
    let (id, _) = register(&app, "Alice").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": "ALICE@campus.test", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "alice@campus.test", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "alice@campus.test", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "STUDENT");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["name"], "Alice");
}

#[tokio::test]
async fn test_requires_token() {
    let (app, _) = app();

    let (status, body) = call(&app, Method::GET, "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = call(&app, Method::GET, "/notifications", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_book_conversation_end_to_end() {
    let (app, _) = app();
    let (alice, alice_token) = register(&app, "Alice").await;
    let (bob, bob_token) = register(&app, "Bob").await;

    // Opening the conversation
    let request = json!({ "itemType": "BOOK", "itemId": "b1", "receiverId": bob });
    let (status, conversation) =
        call(&app, Method::POST, "/conversations", Some(&alice_token), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(conversation["itemType"], "BOOK");
    assert_eq!(conversation["participants"].as_array().unwrap().len(), 2);
    let id = conversation["id"].as_str().unwrap().to_string();

    let (status, again) = call(&app, Method::POST, "/conversations", Some(&alice_token), Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], id.as_str());

    // Sending a message
    let uri = format!("/conversations/{id}/messages");
    let (status, message) = call(
        &app,
        Method::POST,
        &uri,
        Some(&alice_token),
        Some(json!({ "content": "Is this available?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["senderId"], alice.to_string());
    assert_eq!(message["receiverId"], bob.to_string());
    assert_eq!(message["read"], false);

    // Bob is notified
    let (_, notes) = call(&app, Method::GET, "/notifications", Some(&bob_token), None).await;
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["type"], "NEW_MESSAGE");
    assert_eq!(notes[0]["message"], "Alice sent you a message");

    // Bob's inbox shows one unread until he opens the conversation
    let (_, inbox) = call(&app, Method::GET, "/conversations", Some(&bob_token), None).await;
    assert_eq!(inbox[0]["unreadCount"], 1);
    assert_eq!(inbox[0]["messages"].as_array().unwrap().len(), 1);

    let (status, opened) = call(&app, Method::GET, &format!("/conversations/{id}"), Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["messages"][0]["content"], "Is this available?");
    assert_eq!(opened["messages"][0]["read"], true);

    for token in [&alice_token, &bob_token] {
        let (_, inbox) = call(&app, Method::GET, "/conversations", Some(token), None).await;
        assert_eq!(inbox[0]["unreadCount"], 0);
    }

    // Deleting
    let (status, body) =
        call(&app, Method::DELETE, &format!("/conversations/{id}"), Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (_, inbox) = call(&app, Method::GET, "/conversations", Some(&alice_token), None).await;
    assert!(inbox.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejections() {
    let (app, _) = app();
    let (alice, alice_token) = register(&app, "Alice").await;
    let (bob, _) = register(&app, "Bob").await;
    let (_, mallory_token) = register(&app, "Mallory").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/conversations",
        Some(&alice_token),
        Some(json!({ "itemType": "EVENT", "itemId": "e1", "receiverId": alice })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot message yourself");

    let (status, _) = call(
        &app,
        Method::POST,
        "/conversations",
        Some(&alice_token),
        Some(json!({ "itemType": "PARKING_SPOT", "itemId": "p1", "receiverId": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, conversation) = call(
        &app,
        Method::POST,
        "/conversations",
        Some(&alice_token),
        Some(json!({ "itemType": "LOST_ITEM", "itemId": "l1", "receiverId": bob })),
    )
    .await;
    let id = conversation["id"].as_str().unwrap();

    let (status, body) = call(&app, Method::GET, &format!("/conversations/{id}"), Some(&mallory_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "You are not a participant in this conversation");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/conversations/{id}/messages"),
        Some(&alice_token),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message content is required");
}

#[tokio::test]
async fn test_message_rate_limit_envelope() {
    let (app, _) = app();
    let (_, alice_token) = register(&app, "Alice").await;
    let (bob, _) = register(&app, "Bob").await;

    let (_, conversation) = call(
        &app,
        Method::POST,
        "/conversations",
        Some(&alice_token),
        Some(json!({ "itemType": "FOUND_ITEM", "itemId": "f1", "receiverId": bob })),
    )
    .await;
    let uri = format!("/conversations/{}/messages", conversation["id"].as_str().unwrap());

    for i in 0..30 {
        let (status, _) =
            call(&app, Method::POST, &uri, Some(&alice_token), Some(json!({ "content": format!("ping {i}") }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) =
        call(&app, Method::POST, &uri, Some(&alice_token), Some(json!({ "content": "ping 30" }))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "You're sending messages too quickly. Please slow down.");
    assert_eq!(body["remaining"], 0);
    assert!(body["resetTime"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_admin_views() {
    let (app, state) = app();
    let (alice, alice_token) = register(&app, "Alice").await;
    let (bob, _) = register(&app, "Bob").await;

    let (_, conversation) = call(
        &app,
        Method::POST,
        "/conversations",
        Some(&alice_token),
        Some(json!({ "itemType": "BOOK", "itemId": "b1", "receiverId": bob })),
    )
    .await;
    let id = conversation["id"].as_str().unwrap();

    let (status, body) = call(&app, Method::GET, "/admin/conversations", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden - Admin access required");

    let admin_token =
        issue_token(&state.jwt_secret, alice, Some("Alice".into()), "alice@campus.test", Role::Admin).unwrap();

    let (status, page) =
        call(&app, Method::GET, "/admin/conversations?page=1&limit=500", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"], json!({ "page": 1, "limit": 100, "total": 1, "pages": 1 }));
    assert_eq!(page["conversations"][0]["messageCount"], 0);
    assert_eq!(page["conversations"][0]["itemDetails"], Value::Null);

    let (status, detail) =
        call(&app, Method::GET, &format!("/admin/conversations/{id}"), Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["id"], id);

    let missing = format!("/admin/conversations/{}", Uuid::new_v4());
    let (status, _) = call(&app, Method::GET, &missing, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cron_cleanup_requires_secret() {
    let (app, _) = app();

    let (status, _) = call(&app, Method::GET, "/cron/cleanup-messages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::POST, "/cron/cleanup-messages", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for method in [Method::GET, Method::POST] {
        let (status, body) = call(&app, method, "/cron/cleanup-messages", Some(CRON_SECRET), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "deletedMessages": 0, "deletedConversations": 0 }));
    }
}

#[tokio::test]
async fn test_malformed_path_and_query_use_error_envelope() {
    let (app, state) = app();
    let (alice, alice_token) = register(&app, "Alice").await;

    for (method, uri) in [
        (Method::GET, "/conversations/not-a-uuid"),
        (Method::DELETE, "/conversations/not-a-uuid"),
        (Method::GET, "/admin/conversations/not-a-uuid"),
    ] {
        let (status, body) = call(&app, method, uri, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}: {body}");
    }

    let (status, body) = call(
        &app,
        Method::POST,
        "/conversations/not-a-uuid/messages",
        Some(&alice_token),
        Some(json!({ "content": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let admin_token =
        issue_token(&state.jwt_secret, alice, Some("Alice".into()), "alice@campus.test", Role::Admin).unwrap();
    let (status, body) =
        call(&app, Method::GET, "/admin/conversations?page=abc", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
}

#[tokio::test]
async fn test_me_reflects_stored_role() {
    let (app, state) = app();
    let (_, token) = register(&app, "Alice").await;

    let (_, body) = call(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(body["role"], "STUDENT");

    assert!(state.db.set_user_role("alice@campus.test", Role::Admin).unwrap());
    let (status, body) = call(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "ADMIN");

    // A valid token for an account that no longer exists
    let ghost = issue_token(&state.jwt_secret, Uuid::new_v4(), None, "ghost@campus.test", Role::Student).unwrap();
    let (status, _) = call(&app, Method::GET, "/auth/me", Some(&ghost), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
