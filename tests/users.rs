//! User Profile Tests
//!
//! Covers public profiles, profile updates, per-user post listings, stats,
//! and social account links.

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Profiles
// ===========================================================================

#[tokio::test]
async fn get_public_profile_with_counts() {
    let app = app().await;
    let author = app.create_user("prof_counts").await;
    let fan = app.create_user("prof_counts_fan").await;
    app.create_post_for_user(author.id, "published").await;
    app.create_post_for_user(author.id, "draft").await;

    let resp = app
        .post_empty(&format!("/api/users/{}/follow", author.id), Some(&fan.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.get(&format!("/api/users/{}", author.id), None).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["username"].as_str().unwrap(), author.username);
    assert_eq!(body["followers_count"], 1);
    assert_eq!(body["following_count"], 0);
    // Drafts are not counted
    assert_eq!(body["posts_count"], 1);
    // Email stays private
    assert!(body.get("email").is_none());
}

#[tokio::test]
async fn get_unknown_user() {
    let app = app().await;

    let resp = app.get(&format!("/api/users/{}", Uuid::new_v4()), None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "user not found");
}

#[tokio::test]
async fn update_own_profile() {
    let app = app().await;
    let user = app.create_user("prof_update").await;

    let resp = app
        .patch_json(
            "/api/users/me",
            json!({ "name": "New Name", "bio": "Writes about food" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["name"], "New Name");
    assert_eq!(body["bio"], "Writes about food");

    let resp = app.get("/api/users/me", Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["name"], "New Name");
}

#[tokio::test]
async fn update_profile_rejects_empty_name() {
    let app = app().await;
    let user = app.create_user("prof_empty_name").await;

    let resp = app
        .patch_json(
            "/api/users/me",
            json!({ "name": "   " }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "name cannot be empty");
}

#[tokio::test]
async fn update_profile_rejects_bad_image_url() {
    let app = app().await;
    let user = app.create_user("prof_bad_image").await;

    let resp = app
        .patch_json(
            "/api/users/me",
            json!({ "image_url": "javascript:alert(1)" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_profile_requires_auth() {
    let app = app().await;

    let resp = app
        .patch_json("/api/users/me", json!({ "name": "Nope" }), None)
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// User posts
// ===========================================================================

#[tokio::test]
async fn user_posts_hide_drafts_from_others() {
    let app = app().await;
    let author = app.create_user("uposts_author").await;
    let other = app.create_user("uposts_other").await;
    app.create_post_for_user(author.id, "published").await;
    app.create_post_for_user(author.id, "draft").await;

    let path = format!("/api/users/{}/posts", author.id);

    let resp = app.get(&path, Some(&other.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["items"].as_array().unwrap().len(), 1);

    let resp = app.get(&path, None).await;
    assert_eq!(resp.json()["items"].as_array().unwrap().len(), 1);

    let resp = app.get(&path, Some(&author.access_token)).await;
    assert_eq!(resp.json()["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn user_posts_cursor_pagination() {
    let app = app().await;
    let author = app.create_user("uposts_cursor").await;
    for _ in 0..3 {
        app.create_post_for_user(author.id, "published").await;
    }

    let resp = app
        .get(&format!("/api/users/{}/posts?limit=2", author.id), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let resp = app
        .get(
            &format!(
                "/api/users/{}/posts?limit=2&cursor={}",
                author.id,
                urlencode(&cursor)
            ),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn user_posts_invalid_cursor() {
    let app = app().await;
    let author = app.create_user("uposts_badcursor").await;

    let resp = app
        .get(
            &format!("/api/users/{}/posts?cursor=garbage", author.id),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid cursor");
}

#[tokio::test]
async fn user_posts_malformed_params_are_json_400() {
    let app = app().await;
    let author = app.create_user("uposts_badparams").await;

    let resp = app
        .get(&format!("/api/users/{}/posts?limit=abc", author.id), None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid query parameters");

    let resp = app.get("/api/users/not-a-uuid/posts", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid path parameter");
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ===========================================================================
// Stats
// ===========================================================================

#[tokio::test]
async fn my_stats_aggregates_activity() {
    let app = app().await;
    let author = app.create_user("stats_author").await;
    let reader = app.create_user("stats_reader").await;
    let published = app.create_post_for_user(author.id, "published").await;
    app.create_post_for_user(author.id, "draft").await;

    sqlx::query("UPDATE posts SET views = 7 WHERE id = $1")
        .bind(published)
        .execute(app.pool())
        .await
        .unwrap();

    let resp = app
        .post_empty(&format!("/api/posts/{}/clap", published), Some(&reader.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = app
        .post_json(
            &format!("/api/posts/{}/comments", published),
            json!({ "body": "Great read" }),
            Some(&reader.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = app
        .post_empty(&format!("/api/users/{}/follow", author.id), Some(&reader.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.get("/api/users/me/stats", Some(&author.access_token)).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["total_posts"], 2);
    assert_eq!(body["published_posts"], 1);
    assert_eq!(body["draft_posts"], 1);
    assert_eq!(body["total_views"], 7);
    assert_eq!(body["total_claps"], 1);
    assert_eq!(body["total_comments"], 1);
    assert_eq!(body["followers"], 1);
    assert_eq!(body["following"], 0);
}

#[tokio::test]
async fn stats_for_new_user_are_zero() {
    let app = app().await;
    let user = app.create_user("stats_empty").await;

    let resp = app.get("/api/users/me/stats", Some(&user.access_token)).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["total_posts"], 0);
    assert_eq!(body["total_views"], 0);
    assert_eq!(body["total_claps"], 0);
}

// ===========================================================================
// Social accounts
// ===========================================================================

#[tokio::test]
async fn upsert_and_remove_social_account() {
    let app = app().await;
    let user = app.create_user("social_acct").await;

    let resp = app
        .put_json(
            "/api/users/me/social-accounts",
            json!({ "platform": "github", "url": "https://github.com/first" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    // Second write for the same platform replaces the link
    let resp = app
        .put_json(
            "/api/users/me/social-accounts",
            json!({ "platform": "github", "url": "https://github.com/second" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .get(&format!("/api/users/{}/social-accounts", user.id), None)
        .await;
    let accounts = resp.json();
    let accounts = accounts.as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["url"], "https://github.com/second");

    let resp = app
        .delete("/api/users/me/social-accounts/github", Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app
        .delete("/api/users/me/social-accounts/github", Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn social_account_validation() {
    let app = app().await;
    let user = app.create_user("social_acct_bad").await;

    let resp = app
        .put_json(
            "/api/users/me/social-accounts",
            json!({ "platform": "git hub", "url": "https://github.com/x" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .put_json(
            "/api/users/me/social-accounts",
            json!({ "platform": "github", "url": "ftp://github.com/x" }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "url must be an http(s) URL");
}

#[tokio::test]
async fn site_social_accounts_require_admin_token() {
    let app = app().await;

    let resp = app
        .put_admin(
            "/api/site/social-accounts",
            json!({ "platform": "mastodon", "url": "https://mastodon.social/@site" }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .put_admin(
            "/api/site/social-accounts",
            json!({ "platform": "mastodon", "url": "https://mastodon.social/@site" }),
            Some("wrong-token"),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error_message(), "invalid admin token");

    let resp = app
        .put_admin(
            "/api/site/social-accounts",
            json!({ "platform": "mastodon", "url": "https://mastodon.social/@site" }),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.get("/api/site/social-accounts", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let listed = resp.json();
    assert!(listed
        .as_array()
        .unwrap()
        .iter()
        .any(|account| account["platform"] == "mastodon"));
}

#[test]
fn platform_and_link_rules() {
    use collabchron::app::social_accounts::{is_valid_link, is_valid_platform};

    assert!(is_valid_platform("github"));
    assert!(is_valid_platform("stack-overflow_2"));
    assert!(!is_valid_platform(""));
    assert!(!is_valid_platform("GitHub"));
    assert!(!is_valid_platform(&"x".repeat(33)));

    assert!(is_valid_link("https://example.com/me"));
    assert!(is_valid_link("http://example.com"));
    assert!(!is_valid_link("example.com"));
    assert!(!is_valid_link("mailto:me@example.com"));
    assert!(!is_valid_link("file:///etc/passwd"));
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;

    let resp = app.get("/health", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
}
