// HTTP API tests - the full router driven through tower's oneshot, backed by
// an in-memory SQLite store. No sockets are opened.

#![cfg(all(feature = "web", feature = "sqlite"))]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use phishnode::config::Config;
use phishnode::db::models::{Role, User};
use phishnode::db::sqlite::SqliteDatabase;
use phishnode::db::Database;
use phishnode::indicators::normalize::hash;
use phishnode::users::UserRegistry;
use phishnode::web::{build_router, AppState};

struct Node {
    app: Router,
    db: Arc<dyn Database>,
}

impl Node {
    fn new(enforce: bool) -> Self {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let config = Config {
            enforce_user_auth: enforce,
            operator_contacts: vec!["abuse@phishnode.test".to_string()],
            ..Config::default()
        };
        let app = build_router(AppState::new(config, db.clone()));
        Self { app, db }
    }

    /// Create an activated account directly in the store.
    async fn user(&self, name: &str, role: Role) -> User {
        UserRegistry::new(self.db.clone(), true)
            .create(name, &format!("{name}@phishnode.test"), role, true)
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

// ============================================================
// Public routes
// ============================================================

#[tokio::test]
async fn health_and_config_are_public() {
    let node = Node::new(true);

    let (status, body) = node.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = node.get("/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enforce_user_auth"], true);
    assert_eq!(body["operator_contacts"], json!(["abuse@phishnode.test"]));
}

// ============================================================
// Gate
// ============================================================

#[tokio::test]
async fn feed_requires_key_when_enforced() {
    let node = Node::new(true);

    let (status, body) = node.get("/api/indicators").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authorized");

    let (status, body) = node.get("/api/indicators?key=not-a-key").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_key_format");

    let reader = node.user("reader", Role::User).await;
    let (status, body) = node.get(&format!("/api/indicators?key={}", reader.key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "emails": [], "domains": [] }));
}

#[tokio::test]
async fn open_node_serves_feed_without_key() {
    let node = Node::new(false);
    let (status, _) = node.get("/api/indicators/recent").await;
    assert_eq!(status, StatusCode::OK);

    // Submitting still needs a submitter key.
    let (status, _) = node
        .post_json("/api/indicators", json!({ "indicators": ["evil.com"] }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn key_check_resolves_key_on_open_node() {
    let node = Node::new(false);

    let (status, body) = node.get("/api/auth").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authorized");

    let (status, body) = node.get("/api/auth?key=garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_key_format");

    let (status, body) = node.get(&format!("/api/auth?key={}", "f".repeat(40))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authorized");

    let reader = node.user("reader", Role::User).await;
    let (status, body) = node.get(&format!("/api/auth?key={}", reader.key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn plain_user_cannot_submit() {
    let node = Node::new(true);
    let reader = node.user("reader", Role::User).await;
    let (status, body) = node
        .post_json(
            "/api/indicators",
            json!({ "key": reader.key, "indicators": ["evil.com"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authorized");
}

// ============================================================
// Submission and moderation
// ============================================================

#[tokio::test]
async fn submit_moderate_and_read_feed() {
    let node = Node::new(true);
    let submitter = node.user("feeder", Role::Submitter).await;
    let admin = node.user("admin", Role::Admin).await;
    let digest = hash("evil.com");

    let (status, body) = node
        .post_json(
            "/api/indicators",
            json!({
                "key": submitter.key,
                "indicators": ["WWW.EVIL.com", "not-a-valid@@indicator"],
                "tags": ["campaign"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["addedCount"], 1);

    // Resubmission adds nothing.
    let (_, body) = node
        .post_json(
            "/api/indicators",
            json!({ "key": submitter.key, "indicators": ["evil[.]com"] }),
        )
        .await;
    assert_eq!(body["addedCount"], 0);

    let (status, body) = node
        .get(&format!("/api/indicators/all?key={}", submitter.key))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domains"], json!([digest]));

    // Full record is admin-only.
    let (status, _) = node
        .get(&format!("/api/indicators/{digest}?key={}", submitter.key))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = node
        .get(&format!("/api/indicators/{digest}?key={}", admin.key))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["original"], "evil.com");
    assert_eq!(body["owner"], "feeder");
    assert_eq!(body["type"], "domain");

    let (status, body) = node
        .post_json(
            &format!("/api/indicators/disable?key={}", admin.key),
            json!([digest, hash("unknown.example")]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["toggledCount"], 1);

    let (_, body) = node
        .get(&format!("/api/indicators?key={}", submitter.key))
        .await;
    assert_eq!(body["domains"], json!([]));

    let (_, body) = node
        .get(&format!("/api/indicators/disabled?key={}", admin.key))
        .await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn blank_type_falls_back_to_detection() {
    let node = Node::new(true);
    let submitter = node.user("feeder", Role::Submitter).await;
    let (status, body) = node
        .post_json(
            "/api/indicators",
            json!({
                "key": submitter.key,
                "type": "",
                "indicators": ["blank-type.example.com", "phish@blank-type.example.com"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["addedCount"], 2);
}

#[tokio::test]
async fn pending_submissions_show_up_for_admins() {
    let node = Node::new(true);
    let submitter = node.user("feeder", Role::Submitter).await;
    let admin = node.user("admin", Role::Admin).await;

    node.post_json(
        "/api/indicators",
        json!({ "key": submitter.key, "indicators": ["later.example.com"], "enabled": false }),
    )
    .await;

    let (_, body) = node
        .get(&format!("/api/indicators/pending?key={}", admin.key))
        .await;
    assert_eq!(body[0]["status"], "pending");

    let (_, body) = node
        .post_json(
            &format!("/api/indicators/enable?key={}", admin.key),
            json!([hash("later.example.com")]),
        )
        .await;
    assert_eq!(body["toggledCount"], 1);
}

#[tokio::test]
async fn unknown_indicator_details_are_not_found() {
    let node = Node::new(true);
    let admin = node.user("admin", Role::Admin).await;
    let (status, body) = node
        .get(&format!("/api/indicators/{}?key={}", hash("nope.example"), admin.key))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let node = Node::new(true);
    let submitter = node.user("feeder", Role::Submitter).await;
    let (status, body) = node
        .post_json(
            &format!("/api/indicators?key={}", submitter.key),
            json!({ "tags": ["missing indicators field"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

// ============================================================
// Users
// ============================================================

#[tokio::test]
async fn registration_and_activation() {
    let node = Node::new(true);
    let admin = node.user("admin", Role::Admin).await;

    let (status, body) = node
        .post_json(
            "/api/users/register",
            json!({ "name": "Dana", "email": "Dana@Example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let key = body["key"].as_str().unwrap().to_string();
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(key.len(), 40);
    assert_eq!(body["activated"], false);

    let (status, body) = node.get(&format!("/api/auth?key={key}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_activated");

    let (_, body) = node
        .get(&format!("/api/users/pending?key={}", admin.key))
        .await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = node
        .post_json(&format!("/api/users/{id}/activate?key={}", admin.key), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["activated"], true);

    let (status, body) = node.get(&format!("/api/auth?key={key}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, body) = node
        .post_json(
            "/api/users/register",
            json!({ "name": "Dana 2", "email": "dana@example.COM" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_registered");
}

#[tokio::test]
async fn open_node_refuses_registration() {
    let node = Node::new(false);
    let (status, body) = node
        .post_json(
            "/api/users/register",
            json!({ "name": "Eve", "email": "eve@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "auth_not_enforced");
}

// ============================================================
// Reviews
// ============================================================

#[tokio::test]
async fn review_requests() {
    let node = Node::new(true);
    let submitter = node.user("feeder", Role::Submitter).await;
    let reader = node.user("reader", Role::User).await;
    let admin = node.user("admin", Role::Admin).await;

    node.post_json(
        "/api/indicators",
        json!({ "key": submitter.key, "indicators": ["disputed.example.com"] }),
    )
    .await;

    let (status, body) = node
        .post_json(
            "/api/reviews",
            json!({ "key": reader.key, "indicator": hash("unknown.example.com") }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, body) = node
        .post_json(
            "/api/reviews",
            json!({ "key": reader.key, "indicator": hash("disputed.example.com") }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].is_string());

    // Listing is admin-only.
    let (status, _) = node.get(&format!("/api/reviews?key={}", reader.key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = node.get(&format!("/api/reviews?key={}", admin.key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["requested_by"], reader.id.as_str());

    let (status, body) = node
        .get(&format!(
            "/api/reviews/{}?key={}",
            hash("disputed.example.com"),
            admin.key
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (_, body) = node
        .get(&format!(
            "/api/reviews/{}?key={}",
            hash("quiet.example.com"),
            admin.key
        ))
        .await;
    assert_eq!(body, json!([]));
}

// ============================================================
// Alerts
// ============================================================

#[tokio::test]
async fn alerts_are_reported_by_users_and_paged_for_admins() {
    let node = Node::new(true);
    let reader = node.user("reader", Role::User).await;
    let admin = node.user("admin", Role::Admin).await;

    for i in 0..3 {
        let (status, body) = node
            .post_json(
                "/api/alerts",
                json!({
                    "key": reader.key,
                    "type": "url",
                    "match": format!("https://login{i}.evil.com/"),
                    "indicator": hash("evil.com"),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["id"].is_string());
    }

    let (status, _) = node.get(&format!("/api/alerts?key={}", reader.key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = node.get(&format!("/api/alerts?key={}", admin.key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(3));
    assert_eq!(body[0]["user_id"], reader.id.as_str());
    assert_eq!(body[0]["type"], "url");

    let (_, body) = node
        .get(&format!("/api/alerts?key={}&offset=1&limit=1", admin.key))
        .await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = node
        .get(&format!("/api/alerts?key={}&limit=lots", admin.key))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn alert_without_indicator_is_rejected() {
    let node = Node::new(true);
    let reader = node.user("reader", Role::User).await;
    let (status, body) = node
        .post_json(
            "/api/alerts",
            json!({ "key": reader.key, "type": "url", "match": "x", "indicator": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}
