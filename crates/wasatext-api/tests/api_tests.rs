use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use wasatext_api::{AppStateInner, router};
use wasatext_db::Database;

const BOUNDARY: &str = "wasatext-test-boundary";

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    router(Arc::new(AppStateInner {
        db,
        request_timeout: Duration::from_secs(5),
        photo_base_url: "/photos".into(),
        max_upload_bytes: 1024 * 1024,
    }))
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    call(app, builder.body(body).unwrap()).await
}

/// One form part: (field name, optional file name, value).
type Part<'a> = (&'a str, Option<&'a str>, &'a str);

async fn send_form(
    app: &Router,
    method: Method,
    uri: &str,
    token: i64,
    parts: &[Part<'_>],
) -> (StatusCode, Value) {
    let mut body = String::new();
    for (name, file_name, value) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: image/png\r\n\r\n",
                name, file_name
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    call(app, request).await
}

async fn login(app: &Router, name: &str) -> i64 {
    let (status, body) =
        send_json(app, Method::POST, "/session", None, Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["identifier"].as_str().unwrap().parse().unwrap()
}

async fn open_direct(app: &Router, from: i64, to: i64) -> i64 {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/conversations",
        Some(from),
        Some(json!({ "target_user_id": to })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["conversation_id"].as_i64().unwrap()
}

async fn post_text(app: &Router, conversation: i64, sender: i64, text: &str) -> i64 {
    let (status, body) = send_form(
        app,
        Method::POST,
        &format!("/conversations/{}", conversation),
        sender,
        &[("content", None, text)],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["message_id"].as_i64().unwrap()
}

#[tokio::test]
async fn liveness_reports_ok() {
    let app = app();
    let (status, _) = send_json(&app, Method::GET, "/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn session_registers_then_logs_in() {
    let app = app();
    assert_eq!(login(&app, "alice").await, 1);
    assert_eq!(login(&app, "bob").await, 2);
    assert_eq!(login(&app, "alice").await, 1);

    let (status, body) =
        send_json(&app, Method::POST, "/session", None, Some(json!({ "name": "al" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/session",
        None,
        Some(json!({ "name": "alice", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_a_known_bearer() {
    let app = app();
    login(&app, "alice").await;

    let (status, _) = send_json(&app, Method::GET, "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, Method::GET, "/conversations", Some(99), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/conversations")
        .header(header::AUTHORIZATION, "Bearer not-a-number")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_json(&app, Method::GET, "/conversations", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn direct_chat_with_reply() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let carol = login(&app, "carol").await;

    let conversation = open_direct(&app, alice, bob).await;
    assert_eq!(open_direct(&app, bob, alice).await, conversation);

    let m1 = post_text(&app, conversation, alice, "hi").await;
    let (status, body) = send_form(
        &app,
        Method::POST,
        &format!("/conversations/{}", conversation),
        bob,
        &[("content", None, "hello"), ("replyTo", None, m1.to_string().as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let m2 = body["message_id"].as_i64().unwrap();

    let uri = format!("/conversations/{}", conversation);
    let (status, body) = send_json(&app, Method::GET, &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["id"], m1);
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[1]["id"], m2);
    assert_eq!(messages[1]["replyToId"], m1);
    assert_eq!(body["conversation"]["isGroup"], false);
    assert_eq!(body["conversation"]["members"].as_array().unwrap().len(), 2);

    let (status, _) = send_json(&app, Method::GET, &uri, Some(carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(&app, Method::GET, "/conversations/777", Some(alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(&app, Method::GET, "/conversations", Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["lastMessage"]["id"], m2);
}

#[tokio::test]
async fn direct_chat_with_self_is_rejected() {
    let app = app();
    let alice = login(&app, "alice").await;
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/conversations",
        Some(alice),
        Some(json!({ "target_user_id": alice })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_needs_exactly_one_body() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let conversation = open_direct(&app, alice, bob).await;
    let uri = format!("/conversations/{}", conversation);

    let (status, _) = send_form(&app, Method::POST, &uri, alice, &[("forwarded", None, "false")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_form(
        &app,
        Method::POST,
        &uri,
        alice,
        &[("content", None, "hi"), ("image", Some("cat.png"), "PNGDATA")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_form(
        &app,
        Method::POST,
        &uri,
        alice,
        &[("content", None, "hi"), ("replyTo", None, "4040")],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn photo_uploads_return_synthetic_urls() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;

    let (status, body) = send_form(
        &app,
        Method::PUT,
        "/me/photo",
        alice,
        &[("image", Some("me.png"), "PNGDATA")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["photoUrl"], "/photos/users/1/me.png");

    let conversation = open_direct(&app, alice, bob).await;
    let uri = format!("/conversations/{}", conversation);
    let (status, _) = send_form(&app, Method::POST, &uri, bob, &[("image", Some("cat.png"), "PNG")]).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send_json(&app, Method::GET, &uri, Some(alice), None).await;
    let message = &body["messages"][0];
    assert_eq!(
        message["photoUrl"],
        format!("/photos/conversations/{}/cat.png", conversation)
    );
    assert!(message.get("content").is_none());

    let (status, body) =
        send_json(&app, Method::GET, "/users/search?name=ali", Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["photoUrl"], "/photos/users/1/me.png");
}

#[tokio::test]
async fn search_and_rename() {
    let app = app();
    let alice = login(&app, "alice").await;
    login(&app, "bob").await;

    let (status, _) = send_json(&app, Method::GET, "/users/search?name=", Some(alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::PUT,
        "/me/name",
        Some(alice),
        Some(json!({ "name": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(
        &app,
        Method::PUT,
        "/me/name",
        Some(alice),
        Some(json!({ "name": "alicia" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send_json(&app, Method::GET, "/users/search?name=lic", Some(alice), None).await;
    let names: Vec<_> = body.as_array().unwrap().iter().map(|u| u["name"].clone()).collect();
    assert_eq!(names, vec![json!("alicia")]);
}

#[tokio::test]
async fn group_administration() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let carol = login(&app, "carol").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/groups",
        Some(carol),
        Some(json!({ "name": "Team", "memberIds": [alice, bob] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group = body["groupId"].as_i64().unwrap();

    let members_uri = format!("/groups/{}/members", group);
    let (status, _) = send_json(
        &app,
        Method::POST,
        &members_uri,
        Some(carol),
        Some(json!({ "userIds": [4] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &app,
        Method::POST,
        &members_uri,
        Some(carol),
        Some(json!({ "userIds": [alice] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["outcome"], "already_member");

    let (status, body) = send_json(&app, Method::GET, &format!("/groups/{}", group), Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Team");
    let members = body["members"].as_array().unwrap();
    assert_eq!(members.len(), 3);
    assert_eq!(members[0]["userId"], carol);
    assert_eq!(members[0]["isAdmin"], true);

    let name_uri = format!("/groups/{}/name", group);
    let (status, _) = send_json(&app, Method::PUT, &name_uri, Some(bob), Some(json!({ "name": "Mine" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send_json(&app, Method::PUT, &name_uri, Some(carol), Some(json!({ "name": "Crew" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send_form(
        &app,
        Method::PUT,
        &format!("/groups/{}/photo", group),
        carol,
        &[("image", Some("crew.png"), "PNG")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["photoUrl"], format!("/photos/groups/{}/crew.png", group));

    let (status, _) = send_json(
        &app,
        Method::DELETE,
        &format!("/groups/{}/members/{}", group, alice),
        Some(bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &app,
        Method::DELETE,
        &format!("/groups/{}/members/{}", group, bob),
        Some(bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(&app, Method::GET, &format!("/groups/{}", group), Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn direct_conversation_is_not_a_group() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let conversation = open_direct(&app, alice, bob).await;

    let (status, _) = send_json(
        &app,
        Method::GET,
        &format!("/groups/{}", conversation),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forward_reports_denied_targets() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let carol = login(&app, "carol").await;
    let dave = login(&app, "dave").await;

    let source = open_direct(&app, alice, bob).await;
    let allowed = open_direct(&app, alice, carol).await;
    let denied = open_direct(&app, carol, dave).await;
    let m1 = post_text(&app, source, alice, "hi").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        &format!("/messages/{}/forward", m1),
        Some(alice),
        Some(json!({ "conversationIds": [allowed, denied] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwardedMessageIds"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"][0]["conversationId"], denied);
    assert_eq!(body["failures"][0]["error"], "Forbidden");

    let (_, body) = send_json(
        &app,
        Method::GET,
        &format!("/conversations/{}", allowed),
        Some(carol),
        None,
    )
    .await;
    assert_eq!(body["messages"][0]["isForwarded"], true);
    assert_eq!(body["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn reactions_and_deletion() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let conversation = open_direct(&app, alice, bob).await;
    let m1 = post_text(&app, conversation, alice, "hi").await;

    let reactions_uri = format!("/messages/{}/reactions", m1);
    for emoji in ["👍", "🎉"] {
        let (status, _) = send_json(
            &app,
            Method::POST,
            &reactions_uri,
            Some(bob),
            Some(json!({ "emoji": emoji })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let uri = format!("/conversations/{}", conversation);
    let (_, body) = send_json(&app, Method::GET, &uri, Some(alice), None).await;
    assert_eq!(body["messages"][0]["reactions"], json!([{ "userId": bob, "emoji": "🎉" }]));

    let (status, _) = send_json(&app, Method::DELETE, &reactions_uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, Method::DELETE, &reactions_uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let message_uri = format!("/messages/{}", m1);
    let (status, _) = send_json(&app, Method::DELETE, &message_uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, Method::DELETE, &message_uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send_json(&app, Method::GET, &uri, Some(alice), None).await;
    assert_eq!(body["messages"], json!([]));
}
