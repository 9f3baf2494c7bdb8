//! End-to-end flows through the full router, driven in-process with
//! `tower::ServiceExt::oneshot`. An in-memory credential store plays the
//! platform user database; a capturing notifier stands in for email.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use kinder_api::auth::password::hash_password;
use kinder_api::authz::{AccountStatus, Role};
use kinder_api::config::AppConfig;
use kinder_api::credential::{MemoryCredentialStore, UserRecord};
use kinder_api::notify::Notifier;
use kinder_api::routes::app;
use kinder_api::state::AppState;

/// Notifier that records tokens instead of sending email, so tests can
/// follow reset/verification links.
#[derive(Default)]
struct CaptureNotifier {
    reset_tokens: Mutex<Vec<String>>,
    verify_tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CaptureNotifier {
    async fn send_reset_email(&self, _email: &str, token: &str) {
        self.reset_tokens.lock().unwrap().push(token.to_string());
    }

    async fn send_verification_email(&self, _email: &str, token: &str) {
        self.verify_tokens.lock().unwrap().push(token.to_string());
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryCredentialStore>,
    notifier: Arc<CaptureNotifier>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryCredentialStore::new());
    let notifier = Arc::new(CaptureNotifier::default());
    let state = AppState::new(&AppConfig::development(), store.clone(), notifier.clone());
    TestApp { router: app(state), store, notifier }
}

fn seed_user(store: &MemoryCredentialStore, username: &str, password: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_user(UserRecord {
        id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        real_name: None,
        password_hash: hash_password(password, 4).unwrap(),
        role,
        status: AccountStatus::Active,
        email_verified: true,
        kindergarten_id: None,
    });
    id
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

async fn login(router: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        router,
        post_json("/auth/login", json!({ "username": username, "password": password })),
    )
    .await
}

#[tokio::test]
async fn login_issues_tokens_accepted_by_protected_routes() {
    let app = test_app();
    seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    let (status, body) = login(&app.router, "teacher1", "password123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["user"]["role"], json!("teacher"));

    let token = body["data"]["token"].as_str().unwrap();
    let (status, body) = send(&app.router, get_with_token("/api/auth/whoami", token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], json!("teacher1"));
    assert!(body["data"]["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("activity:manage")));
}

#[tokio::test]
async fn login_failures_never_say_which_part_was_wrong() {
    let app = test_app();
    let id = seed_user(&app.store, "parent1", "password123", Role::Parent);

    let (status, wrong_password) = login(&app.router, "parent1", "nope-nope").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_user) = login(&app.router, "nobody", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password["message"], unknown_user["message"]);

    app.store.set_status(id, AccountStatus::Disabled);
    let (status, disabled) = login(&app.router, "parent1", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(disabled["message"], unknown_user["message"]);
}

#[tokio::test]
async fn sixth_failed_login_is_throttled_with_retry_after() {
    let app = test_app();
    seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    for _ in 0..5 {
        let (status, _) = login(&app.router, "teacher1", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/auth/login",
            json!({ "username": "teacher1", "password": "wrong-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["retryAfter"].as_u64().unwrap() > 0);

    // The right password is throttled too while the window lasts.
    let (status, _) = login(&app.router, "teacher1", "password123").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn successful_login_clears_the_failure_counter() {
    let app = test_app();
    seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    for _ in 0..4 {
        login(&app.router, "teacher1", "wrong-password").await;
    }
    let (status, _) = login(&app.router, "teacher1", "password123").await;
    assert_eq!(status, StatusCode::OK);

    // Counter was reset: four more misses fit in a fresh window.
    for _ in 0..4 {
        let (status, _) = login(&app.router, "teacher1", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn malformed_json_bodies_get_the_error_envelope() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("INVALID_JSON"));
}

#[tokio::test]
async fn invalid_login_payloads_still_count_against_the_limiter() {
    let app = test_app();

    // Empty credentials fail validation, but only after being counted.
    for _ in 0..5 {
        let (status, _) = login(&app.router, "", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, _) = login(&app.router, "", "").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn refresh_rotates_and_replay_forces_relogin() {
    let app = test_app();
    seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    let (_, body) = login(&app.router, "teacher1", "password123").await;
    let original = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": original }))).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, original);

    // Replay of the pre-rotation token revokes the family.
    let (status, _) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": original }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The legitimately rotated token died with it.
    let (status, _) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": rotated }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login recovers.
    let (status, _) = login(&app.router, "teacher1", "password123").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_with_garbage_or_unknown_token_is_unauthorized() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        post_json("/auth/refresh", json!({ "refreshToken": "no-dot-here" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let phantom = format!("{}.never-issued", Uuid::new_v4().simple());
    let (status, body) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": phantom }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("UNAUTHORIZED"));
}

#[tokio::test]
async fn logout_revokes_refresh_but_not_the_live_access_token() {
    let app = test_app();
    seed_user(&app.store, "parent1", "password123", Role::Parent);

    let (_, body) = login(&app.router, "parent1", "password123").await;
    let token = body["data"]["token"].as_str().unwrap().to_string();
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": refresh }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Access token rides out its TTL.
    let (status, _) = send(&app.router, get_with_token("/api/auth/whoami", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_garbage_tokens() {
    let app = test_app();

    let (status, body) =
        send(&app.router, Request::builder().uri("/api/auth/whoami").body(Body::empty()).unwrap())
            .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(&app.router, get_with_token("/api/auth/whoami", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn disabled_account_loses_access_before_token_expiry() {
    let app = test_app();
    let id = seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    let (_, body) = login(&app.router, "teacher1", "password123").await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    app.store.set_status(id, AccountStatus::Disabled);
    let (status, _) = send(&app.router, get_with_token("/api/auth/whoami", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_then_duplicate_then_validation_errors() {
    let app = test_app();

    let payload = json!({
        "username": "newparent",
        "email": "newparent@example.com",
        "password": "password123",
    });
    let (status, body) = send(&app.router, post_json("/auth/register", payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["role"], json!("parent"));
    assert_eq!(app.notifier.verify_tokens.lock().unwrap().len(), 1);

    let (status, body) = send(&app.router, post_json("/auth/register", payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("CONFLICT"));

    let (status, body) = send(
        &app.router,
        post_json(
            "/auth/register",
            json!({ "username": "x", "email": "not-an-email", "password": "short" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn self_registration_cannot_claim_admin_roles() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/auth/register",
            json!({
                "username": "sneaky",
                "email": "sneaky@example.com",
                "password": "password123",
                "role": "admin",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn email_verification_token_is_single_use() {
    let app = test_app();

    send(
        &app.router,
        post_json(
            "/auth/register",
            json!({
                "username": "newparent",
                "email": "newparent@example.com",
                "password": "password123",
            }),
        ),
    )
    .await;
    let token = app.notifier.verify_tokens.lock().unwrap()[0].clone();

    let uri = format!("/auth/verify-email?token={token}");
    let (status, _) =
        send(&app.router, Request::builder().uri(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(&app.router, Request::builder().uri(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Verification link has already been used"));
}

#[tokio::test]
async fn password_reset_flow_ends_outstanding_sessions() {
    let app = test_app();
    seed_user(&app.store, "parent1", "password123", Role::Parent);

    let (_, body) = login(&app.router, "parent1", "password123").await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        post_json("/auth/forgot-password", json!({ "email": "parent1@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = app.notifier.reset_tokens.lock().unwrap()[0].clone();
    let (status, _) = send(
        &app.router,
        post_json(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": "brand-new-pass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old refresh token is dead, old password no longer works.
    let (status, _) =
        send(&app.router, post_json("/auth/refresh", json!({ "refreshToken": refresh }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app.router, "parent1", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app.router, "parent1", "brand-new-pass").await;
    assert_eq!(status, StatusCode::OK);

    // The token was consumed; replaying it fails.
    let token = app.notifier.reset_tokens.lock().unwrap()[0].clone();
    let (status, _) = send(
        &app.router,
        post_json(
            "/auth/reset-password",
            json!({ "token": token, "newPassword": "another-pass-1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_password_answers_identically_for_unknown_email() {
    let app = test_app();
    seed_user(&app.store, "parent1", "password123", Role::Parent);

    let (status, known) = send(
        &app.router,
        post_json("/auth/forgot-password", json!({ "email": "parent1@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, unknown) = send(
        &app.router,
        post_json("/auth/forgot-password", json!({ "email": "stranger@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(known["message"], unknown["message"]);

    // Only the known address got an email.
    assert_eq!(app.notifier.reset_tokens.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn change_password_demands_the_current_password() {
    let app = test_app();
    seed_user(&app.store, "teacher1", "password123", Role::Teacher);

    let (_, body) = login(&app.router, "teacher1", "password123").await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let change = |current: &str, new: &str| {
        Request::builder()
            .method("PUT")
            .uri("/api/auth/change-password")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(
                json!({ "currentPassword": current, "newPassword": new }).to_string(),
            ))
            .unwrap()
    };

    let (status, _) = send(&app.router, change("wrong-current", "brand-new-pass")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, change("password123", "password123")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, change("password123", "brand-new-pass")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app.router, "teacher1", "brand-new-pass").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_and_root_answer_without_auth() {
    let app = test_app();

    let (status, body) =
        send(&app.router, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ok"));

    let (status, body) =
        send(&app.router, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}
