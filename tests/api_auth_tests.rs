// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication, role resolution and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Roles are resolved per request, and an unreadable role is treated as
//!    unauthenticated
//! 3. Permission failures carry remediation text
//! 4. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use std::sync::Arc;
use tower::ServiceExt;
use training_academy::config::Config;
use training_academy::error::AppError;
use training_academy::middleware::auth::SESSION_COOKIE;
use training_academy::models::UserStatus;

mod common;
use common::{create_test_app, create_test_app_with, seed_user, FlakyStore};

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = create_test_app();
    let (status, body) = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _) = create_test_app();
    let (status, body) = app.request(Method::GET, "/api/me", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_rejected() {
    let (app, _) = create_test_app();
    let token = training_academy::middleware::auth::create_jwt(
        "user-1",
        None,
        None,
        b"some_other_key_that_is_long_enough",
    )
    .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let (app, _) = create_test_app();
    let token = app.token("cookie-user");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_implicit_user_without_record() {
    let (app, _) = create_test_app();
    let (status, body) = app
        .request(Method::GET, "/api/me", Some("newcomer"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], "newcomer");
    assert_eq!(body["role"], "user");
    assert_eq!(body["is_admin"], false);
    assert!(body["status"].is_null());
}

#[tokio::test]
async fn test_role_is_case_folded_for_admin_capability() {
    let (app, store) = create_test_app();
    for (uid, role, expected) in [
        ("a1", "ADMIN", true),
        ("a2", "Super Admin", true),
        ("a3", "super ADMIN", true),
        ("t1", "trainer", false),
        ("t2", "administrator", false),
        ("t3", "superadmin", false),
    ] {
        seed_user(store.as_ref(), uid, Some(role), UserStatus::Approved).await;
        let (status, body) = app.request(Method::GET, "/api/me", Some(uid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_admin"], expected, "role {:?}", role);
        assert_eq!(body["role"], role.to_lowercase());
    }
}

#[tokio::test]
async fn test_unreadable_role_is_unauthenticated() {
    let store = Arc::new(FlakyStore::default());
    let app = create_test_app_with(Config::test_default(), store.clone());
    seed_user(&store.inner, "admin-1", Some("admin"), UserStatus::Approved).await;
    FlakyStore::set(&store.fail_user_reads, true);

    let (status, _) = app
        .request(Method::GET, "/api/conversations", Some("admin-1"), None)
        .await;

    // Never falls back to a default role
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_route_rejects_trainee_with_remediation() {
    let (app, store) = create_test_app();
    seed_user(store.as_ref(), "trainee-1", None, UserStatus::Approved).await;

    let (status, body) = app
        .request(Method::GET, "/api/admin/access-requests", Some("trainee-1"), None)
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin_required");
    assert_eq!(body["remediation"], AppError::PERMISSION_REMEDIATION);
}

#[tokio::test]
async fn test_trainee_cannot_read_another_thread() {
    let (app, store) = create_test_app();
    seed_user(store.as_ref(), "trainee-1", None, UserStatus::Approved).await;
    seed_user(store.as_ref(), "trainee-2", None, UserStatus::Approved).await;

    let (status, body) = app
        .request(
            Method::GET,
            "/api/conversations/trainee-2/messages",
            Some("trainee-1"),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");
    assert_eq!(body["remediation"], AppError::PERMISSION_REMEDIATION);
}

#[tokio::test]
async fn test_cors_preflight_from_frontend() {
    let (app, _) = create_test_app();
    let frontend = app.state.config.frontend_url.clone();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/me")
                .header(header::ORIGIN, &frontend)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        frontend.as_str()
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_register_creates_pending_user_and_conversation() {
    let (app, store) = create_test_app();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/me/register",
            Some("fresh"),
            Some(serde_json::json!({ "display_name": "Fresh Face" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["display_name"], "Fresh Face");
    assert_eq!(body["email"], "test@example.com");

    use training_academy::db::DocumentStore;
    let conversation = store.get_conversation("fresh").await.unwrap().unwrap();
    assert_eq!(conversation.user_name, "Fresh Face");
    assert!(conversation.last_message.is_none());

    // Second registration keeps the original record
    let (_, again) = app
        .request(
            Method::POST,
            "/api/me/register",
            Some("fresh"),
            Some(serde_json::json!({ "display_name": "Renamed" })),
        )
        .await;
    assert_eq!(again["display_name"], "Fresh Face");
}
