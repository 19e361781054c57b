//! Authentication Tests
//!
//! Covers signup validation, login, token lifecycle, and protected routes.

mod common;

use axum::http::StatusCode;
use common::{app, DEFAULT_PASSWORD};
use serde_json::json;

// ===========================================================================
// Signup
// ===========================================================================

#[tokio::test]
async fn signup_creates_user() {
    let app = app().await;

    let resp = app
        .post_json(
            "/api/auth/signup",
            json!({
                "username": "signup_ok",
                "email": "Signup_OK@Example.com",
                "name": "Signup Ok",
                "password": DEFAULT_PASSWORD
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert!(body["id"].is_string());
    assert_eq!(body["username"], "signup_ok");
    assert_eq!(body["email"], "signup_ok@example.com");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn signup_duplicate_username() {
    let app = app().await;
    let existing = app.create_user("signup_dup").await;

    let resp = app
        .post_json(
            "/api/auth/signup",
            json!({
                "username": existing.username,
                "email": "fresh_dup@example.com",
                "name": "Dup",
                "password": DEFAULT_PASSWORD
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.error_message(), "username already taken");
}

#[tokio::test]
async fn signup_duplicate_email() {
    let app = app().await;
    let existing = app.create_user("signup_dup_email").await;

    let resp = app
        .post_json(
            "/api/auth/signup",
            json!({
                "username": "signup_other",
                "email": existing.email,
                "name": "Dup",
                "password": DEFAULT_PASSWORD
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.error_message(), "email already taken");
}

#[tokio::test]
async fn signup_rejects_bad_username() {
    let app = app().await;
    let too_long = "x".repeat(31);

    for username in ["ab", "Has_Upper", "with-dash", too_long.as_str()] {
        let resp = app
            .post_json(
                "/api/auth/signup",
                json!({
                    "username": username,
                    "email": "bad_username@example.com",
                    "name": "Bad",
                    "password": DEFAULT_PASSWORD
                }),
                None,
            )
            .await;

        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "username {username:?}");
    }
}

#[tokio::test]
async fn signup_rejects_short_password() {
    let app = app().await;

    let resp = app
        .post_json(
            "/api/auth/signup",
            json!({
                "username": "short_pw",
                "email": "short_pw@example.com",
                "name": "Short",
                "password": "1234567"
            }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "password must be at least 8 characters"
    );
}

async fn signup_with_password(
    app: &common::TestApp,
    suffix: &str,
    password: &str,
) -> common::TestResponse {
    app.post_json(
        "/api/auth/signup",
        json!({
            "username": format!("pw_{}", suffix),
            "email": format!("pw_{}@example.com", suffix),
            "name": "Multibyte",
            "password": password
        }),
        None,
    )
    .await
}

#[tokio::test]
async fn password_length_counts_characters() {
    let app = app().await;

    // 'é' is 2 bytes and '€' is 3 bytes in UTF-8
    let resp = signup_with_password(app, "mb_seven", &"€".repeat(7)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "password must be at least 8 characters");

    let resp = signup_with_password(app, "mb_eight", &"€".repeat(8)).await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = signup_with_password(app, "mb_max", &"é".repeat(128)).await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = signup_with_password(app, "mb_over", &"é".repeat(129)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "password must be at most 128 characters");
}

#[tokio::test]
async fn malformed_json_body_is_json_400() {
    let app = app().await;

    let resp = app
        .post_raw("/api/auth/signup", "{\"username\": ", "application/json", None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "malformed JSON body");

    // Well-formed JSON with a missing field
    let resp = app
        .post_json("/api/auth/login", json!({ "identifier": "someone" }), None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid request body");

    let resp = app
        .post_raw("/api/auth/login", "identifier=x", "text/plain", None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.json()["error"].is_string());
}

// ===========================================================================
// Login
// ===========================================================================

#[tokio::test]
async fn login_with_email_or_username() {
    let app = app().await;
    let user = app.create_user("login_valid").await;

    for identifier in [user.email.as_str(), user.username.as_str()] {
        let resp = app
            .post_json(
                "/api/auth/login",
                json!({ "identifier": identifier, "password": DEFAULT_PASSWORD }),
                None,
            )
            .await;

        assert_eq!(resp.status, StatusCode::OK);
        let body = resp.json();
        assert!(body["access_token"].is_string());
        assert!(body["refresh_token"].is_string());
        assert!(body["access_expires_at"].is_string());
        assert!(body["refresh_expires_at"].is_string());
    }
}

#[tokio::test]
async fn login_invalid_password() {
    let app = app().await;
    let user = app.create_user("login_badpw").await;

    let resp = app
        .post_json(
            "/api/auth/login",
            json!({ "identifier": user.email, "password": "wrong_password" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_nonexistent_user() {
    let app = app().await;

    let resp = app
        .post_json(
            "/api/auth/login",
            json!({ "identifier": "nobody@example.com", "password": "whatever123" }),
            None,
        )
        .await;

    // Same message as a wrong password
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid credentials");
}

#[tokio::test]
async fn login_empty_identifier() {
    let app = app().await;

    let resp = app
        .post_json(
            "/api/auth/login",
            json!({ "identifier": "", "password": "somepassword" }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Token lifecycle
// ===========================================================================

#[tokio::test]
async fn refresh_rotates_token() {
    let app = app().await;
    let user = app.create_user("refresh_rotate").await;

    let resp = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let new_refresh = resp.json()["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, user.refresh_token);

    // The rotated-out token is no longer accepted
    let reuse = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(reuse.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reuse.error_message(), "invalid refresh token");
}

#[tokio::test]
async fn revoked_refresh_token_is_rejected() {
    let app = app().await;
    let user = app.create_user("refresh_revoke").await;

    let resp = app
        .post_json(
            "/api/auth/revoke",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": user.refresh_token }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    let app = app().await;
    let user = app.create_user("refresh_wrongtype").await;

    let resp = app
        .post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": user.access_token }),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Protected routes
// ===========================================================================

#[tokio::test]
async fn me_returns_current_user() {
    let app = app().await;
    let user = app.create_user("auth_me").await;

    let resp = app.get("/api/auth/me", Some(&user.access_token)).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["id"].as_str().unwrap(), user.id.to_string());
    assert_eq!(body["username"].as_str().unwrap(), user.username);
}

#[tokio::test]
async fn me_requires_token() {
    let app = app().await;

    let resp = app.get("/api/auth/me", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "missing Authorization header");

    let resp = app.get("/api/auth/me", Some("not-a-token")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.error_message(), "invalid token");
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() {
    let app = app().await;
    let user = app.create_user("auth_typ").await;

    let resp = app.get("/api/auth/me", Some(&user.refresh_token)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_key_is_not_a_session_token() {
    let app = app().await;
    let user = app.create_user("auth_apikey_session").await;
    let key = app.create_api_key(user.id).await;

    let resp = app.get("/api/auth/me", Some(&key.secret)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
