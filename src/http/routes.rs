use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::{handlers, public_api as v1};
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh_token))
        .route("/api/auth/revoke", post(handlers::revoke_token))
        .route("/api/auth/me", get(handlers::get_current_user))
}

pub fn users() -> Router<AppState> {
    Router::new()
        // Authenticated user's own account
        .route(
            "/api/users/me",
            get(handlers::get_current_user).patch(handlers::update_profile),
        )
        .route("/api/users/me/stats", get(handlers::my_stats))
        .route(
            "/api/users/me/social-accounts",
            get(handlers::list_my_social_accounts).put(handlers::upsert_my_social_account),
        )
        .route(
            "/api/users/me/social-accounts/:platform",
            delete(handlers::delete_my_social_account),
        )
        .route("/api/users/:id", get(handlers::get_user))
        .route("/api/users/:id/posts", get(handlers::list_user_posts))
        .route(
            "/api/users/:id/social-accounts",
            get(handlers::list_user_social_accounts),
        )
}

pub fn social() -> Router<AppState> {
    Router::new()
        .route(
            "/api/users/:id/follow",
            post(handlers::follow_user).delete(handlers::unfollow_user),
        )
        .route("/api/users/:id/followers", get(handlers::list_followers))
        .route("/api/users/:id/following", get(handlers::list_following))
        .route(
            "/api/users/:id/relationship",
            get(handlers::relationship_status),
        )
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(handlers::list_categories))
        .route(
            "/api/posts",
            post(handlers::create_post).get(handlers::list_posts),
        )
        .route(
            "/api/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
}

pub fn engagement() -> Router<AppState> {
    Router::new()
        .route(
            "/api/posts/:id/clap",
            post(handlers::clap_post).delete(handlers::unclap_post),
        )
        .route("/api/posts/:id/claps", get(handlers::post_claps))
        .route(
            "/api/posts/:id/comments",
            post(handlers::create_comment).get(handlers::list_comments),
        )
        .route("/api/comments/:id", delete(handlers::delete_comment))
        .route(
            "/api/comments/:id/clap",
            post(handlers::clap_comment).delete(handlers::unclap_comment),
        )
}

pub fn api_keys() -> Router<AppState> {
    Router::new()
        .route(
            "/api/keys",
            post(handlers::create_api_key).get(handlers::list_api_keys),
        )
        .route("/api/keys/:id", delete(handlers::revoke_api_key))
}

pub fn site() -> Router<AppState> {
    Router::new().route(
        "/api/site/social-accounts",
        get(handlers::list_site_social_accounts).put(handlers::upsert_site_social_account),
    )
}

/// Routes served under `/api/v1`. Authentication and rate limiting are
/// layered on by the caller.
pub fn public_api() -> Router<AppState> {
    Router::new()
        .route("/posts", get(v1::list_posts))
        .route("/posts/latest", get(v1::latest_posts))
        .route("/posts/:id", get(v1::get_post))
        .route("/users/profile", get(v1::profile))
        .route("/users/posts", get(v1::user_posts))
        .route("/users/stats", get(v1::stats))
}
