//! Versioned read API for third-party clients, authenticated by API key.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::analytics::AnalyticsService;
use crate::app::posts::PostService;
use crate::app::users::UserService;
use crate::domain::pagination::PageMeta;
use crate::domain::post::Post;
use crate::domain::stats::UserStats;
use crate::domain::user::PublicUser;
use crate::http::extract::{Json, Path, Query};
use crate::http::handlers::{page_request, PageQuery, PostPageResponse};
use crate::http::{ApiKeyUser, AppError};
use crate::AppState;

const DEFAULT_LATEST_LIMIT: i64 = 5;
const MAX_LATEST_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct LatestQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct LatestPostsResponse {
    pub posts: Vec<Post>,
}

pub async fn list_posts(
    _caller: ApiKeyUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPageResponse>, AppError> {
    let (page, category) = page_request(query)?;

    let service = PostService::new(state.db.clone());
    let (posts, total) = service
        .list_published(page, category.as_deref())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    Ok(Json(PostPageResponse {
        posts,
        meta: PageMeta::new(page, total),
    }))
}

pub async fn latest_posts(
    _caller: ApiKeyUser,
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<LatestPostsResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LATEST_LIMIT);
    if !(1..=MAX_LATEST_LIMIT).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 50"));
    }

    let service = PostService::new(state.db.clone());
    let posts = service.latest(limit).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list latest posts");
        AppError::internal("failed to list latest posts")
    })?;

    Ok(Json(LatestPostsResponse { posts }))
}

/// Reading a post through the public API counts as a view.
pub async fn get_post(
    Path(id): Path<Uuid>,
    _caller: ApiKeyUser,
    State(state): State<AppState>,
) -> Result<Json<Post>, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service.record_view(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn profile(
    ApiKeyUser(caller): ApiKeyUser,
    State(state): State<AppState>,
) -> Result<Json<PublicUser>, AppError> {
    let service = UserService::new(state.db.clone());
    let profile = service.get_profile(caller.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %caller.user_id, "failed to fetch profile");
        AppError::internal("failed to fetch profile")
    })?;

    profile
        .map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

pub async fn user_posts(
    ApiKeyUser(caller): ApiKeyUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPageResponse>, AppError> {
    let (page, _) = page_request(query)?;

    let service = PostService::new(state.db.clone());
    let (posts, total) = service
        .list_owned(caller.user_id, page)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %caller.user_id, "failed to list user posts");
            AppError::internal("failed to list user posts")
        })?;

    Ok(Json(PostPageResponse {
        posts,
        meta: PageMeta::new(page, total),
    }))
}

pub async fn stats(
    ApiKeyUser(caller): ApiKeyUser,
    State(state): State<AppState>,
) -> Result<Json<UserStats>, AppError> {
    let service = AnalyticsService::new(state.db.clone());
    let stats = service.user_stats(caller.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %caller.user_id, "failed to compute user stats");
        AppError::internal("failed to compute user stats")
    })?;

    Ok(Json(stats))
}
