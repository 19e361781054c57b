use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::analytics::AnalyticsService;
use crate::app::api_keys::{is_valid_permission, ApiKeyService, CreateKeyOutcome, NewApiKey};
use crate::app::auth::NewUser;
use crate::app::engagement::{ClapOutcome, EngagementService};
use crate::app::posts::{NewPost, PostService, PostUpdate};
use crate::app::social::{FollowOutcome, SocialService};
use crate::app::social_accounts::{is_valid_link, is_valid_platform, SocialAccountService};
use crate::app::users::{ProfileUpdate, UserService};
use crate::domain::api_key::ApiKey;
use crate::domain::engagement::{ClapSummary, Comment};
use crate::domain::pagination::{PageMeta, PageRequest};
use crate::domain::post::{Category, Post, PostStatus};
use crate::domain::social_account::{SiteSocialAccount, UserSocialAccount};
use crate::domain::stats::UserStats;
use crate::domain::user::{PublicUser, User};
use crate::http::error::{is_foreign_key_violation, unique_violation};
use crate::http::extract::{Json, Path, Query};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

const MAX_PASSWORD_LEN: usize = 128;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;
const MAX_BIO_LEN: usize = 1000;
const MAX_EMAIL_LEN: usize = 254;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_CONTENT_LEN: usize = 100_000;
const MAX_COMMENT_LEN: usize = 5000;
const MAX_KEY_NAME_LEN: usize = 100;
const MAX_KEY_TTL_DAYS: i64 = 365;
const DEFAULT_LIST_LIMIT: i64 = 20;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct PostPageResponse {
    pub posts: Vec<Post>,
    pub meta: PageMeta,
}

pub(crate) fn page_request(
    query: PageQuery,
) -> Result<(PageRequest, Option<String>), AppError> {
    let page = PageRequest::parse(query.page, query.limit).map_err(AppError::bad_request)?;
    let category = query.category.filter(|category| !category.trim().is_empty());
    Ok((page, category))
}

fn list_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=100).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 100"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (timestamp, id) = cursor
        .split_once('/')
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

/// Pops the look-ahead row fetched beyond `limit` and turns it into the next cursor.
fn split_page<T>(
    items: &mut Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> (OffsetDateTime, Uuid),
) -> Option<String> {
    if items.len() > limit as usize {
        items.truncate(limit as usize);
        encode_cursor(items.last().map(key))
    } else {
        None
    }
}

fn is_valid_username(username: &str) -> bool {
    (3..=30).contains(&username.len())
        && username
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    email.len() <= MAX_EMAIL_LEN
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<User>, AppError> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_string();
    let name = payload.name.trim().to_string();

    if !is_valid_username(&username) {
        return Err(AppError::bad_request(
            "username must be 3-30 characters of a-z, 0-9 or _",
        ));
    }
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("invalid email"));
    }
    if name.is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }
    if char_len(&name) > MAX_NAME_LEN {
        return Err(AppError::bad_request("name must be at most 100 characters"));
    }
    let password_len = char_len(&payload.password);
    if password_len < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    if password_len > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let user = state
        .auth_service()
        .signup(NewUser {
            username,
            email,
            name,
            password: payload.password,
        })
        .await
        .map_err(|err| {
            if let Some(constraint) = unique_violation(&err) {
                if constraint.contains("users_username_key") {
                    return AppError::conflict("username already taken");
                }
                if constraint.contains("users_email_key") {
                    return AppError::conflict("email already taken");
                }
            }
            tracing::error!(error = ?err, "failed to create user");
            AppError::internal("failed to create user")
        })?;

    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

impl From<crate::app::auth::TokenPair> for AuthTokenResponse {
    fn from(tokens: crate::app::auth::TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.identifier.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("identifier and password are required"));
    }
    if char_len(&payload.password) > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let tokens = state
        .auth_service()
        .login(payload.identifier.trim(), &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    tokens
        .map(|tokens| Json(tokens.into()))
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let tokens = state
        .auth_service()
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to refresh token");
            AppError::internal("failed to refresh token")
        })?;

    tokens
        .map(|tokens| Json(tokens.into()))
        .ok_or_else(|| AppError::unauthorized("invalid refresh token"))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let revoked = state
        .auth_service()
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to revoke token");
            AppError::internal("failed to revoke token")
        })?;

    tracing::debug!(revoked, "refresh token revocation requested");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let service = UserService::new(state.db.clone());
    let user = service.get_user(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to fetch current user");
        AppError::internal("failed to fetch current user")
    })?;

    user.map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn get_user(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PublicUser>, AppError> {
    let service = UserService::new(state.db.clone());
    let profile = service.get_profile(id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %id, "failed to fetch user");
        AppError::internal("failed to fetch user")
    })?;

    profile
        .map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
}

pub async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    let name = payload.name.map(|name| name.trim().to_string());
    if let Some(name) = &name {
        if name.is_empty() {
            return Err(AppError::bad_request("name cannot be empty"));
        }
        if char_len(name) > MAX_NAME_LEN {
            return Err(AppError::bad_request("name must be at most 100 characters"));
        }
    }
    if let Some(bio) = &payload.bio {
        if char_len(bio) > MAX_BIO_LEN {
            return Err(AppError::bad_request("bio must be at most 1000 characters"));
        }
    }
    if let Some(image_url) = &payload.image_url {
        if !is_valid_link(image_url) {
            return Err(AppError::bad_request("image_url must be an http(s) URL"));
        }
    }

    let service = UserService::new(state.db.clone());
    let user = service
        .update_profile(
            auth.user_id,
            ProfileUpdate {
                name,
                bio: payload.bio,
                image_url: payload.image_url,
            },
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to update profile");
            AppError::internal("failed to update profile")
        })?;

    user.map(Json)
        .ok_or_else(|| AppError::not_found("user not found"))
}

pub async fn list_user_posts(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Post>>, AppError> {
    let limit = list_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;
    let viewer_id = auth.map(|user| user.user_id);

    let service = PostService::new(state.db.clone());
    let mut posts = service
        .list_by_user(id, viewer_id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to list user posts");
            AppError::internal("failed to list user posts")
        })?;

    let next_cursor = split_page(&mut posts, limit, |post| (post.created_at, post.id));

    Ok(Json(ListResponse {
        items: posts,
        next_cursor,
    }))
}

pub async fn my_stats(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserStats>, AppError> {
    let service = AnalyticsService::new(state.db.clone());
    let stats = service.user_stats(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to compute user stats");
        AppError::internal("failed to compute user stats")
    })?;

    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Social accounts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SocialAccountRequest {
    pub platform: String,
    pub url: String,
}

fn validate_social_account(payload: &SocialAccountRequest) -> Result<(String, String), AppError> {
    let platform = payload.platform.trim().to_lowercase();
    let url = payload.url.trim().to_string();
    if !is_valid_platform(&platform) {
        return Err(AppError::bad_request(
            "platform must be 1-32 characters of a-z, 0-9, _ or -",
        ));
    }
    if !is_valid_link(&url) {
        return Err(AppError::bad_request("url must be an http(s) URL"));
    }
    Ok((platform, url))
}

pub async fn list_user_social_accounts(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSocialAccount>>, AppError> {
    let service = SocialAccountService::new(state.db.clone());
    let accounts = service.list_for_user(id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %id, "failed to list social accounts");
        AppError::internal("failed to list social accounts")
    })?;

    Ok(Json(accounts))
}

pub async fn list_my_social_accounts(
    auth: AuthUser,
    state: State<AppState>,
) -> Result<Json<Vec<UserSocialAccount>>, AppError> {
    list_user_social_accounts(Path(auth.user_id), state).await
}

pub async fn upsert_my_social_account(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SocialAccountRequest>,
) -> Result<Json<UserSocialAccount>, AppError> {
    let (platform, url) = validate_social_account(&payload)?;

    let service = SocialAccountService::new(state.db.clone());
    let account = service
        .upsert_for_user(auth.user_id, &platform, &url)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to save social account");
            AppError::internal("failed to save social account")
        })?;

    Ok(Json(account))
}

pub async fn delete_my_social_account(
    Path(platform): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = SocialAccountService::new(state.db.clone());
    let removed = service
        .remove_for_user(auth.user_id, &platform.to_lowercase())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to remove social account");
            AppError::internal("failed to remove social account")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("social account not found"))
    }
}

pub async fn list_site_social_accounts(
    State(state): State<AppState>,
) -> Result<Json<Vec<SiteSocialAccount>>, AppError> {
    let service = SocialAccountService::new(state.db.clone());
    let accounts = service.list_site().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list site social accounts");
        AppError::internal("failed to list site social accounts")
    })?;

    Ok(Json(accounts))
}

pub async fn upsert_site_social_account(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<SocialAccountRequest>,
) -> Result<Json<SiteSocialAccount>, AppError> {
    let (platform, url) = validate_social_account(&payload)?;

    let service = SocialAccountService::new(state.db.clone());
    let account = service.upsert_site(&platform, &url).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to save site social account");
        AppError::internal("failed to save site social account")
    })?;

    Ok(Json(account))
}

// ---------------------------------------------------------------------------
// Follows
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct FollowResponse {
    pub followed: bool,
}

pub async fn follow_user(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<FollowResponse>, AppError> {
    if auth.user_id == id {
        return Err(AppError::bad_request("cannot follow yourself"));
    }

    let service = SocialService::new(state.db.clone());
    let outcome = service.follow(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, follower_id = %auth.user_id, following_id = %id, "failed to follow user");
        AppError::internal("failed to follow user")
    })?;

    match outcome {
        FollowOutcome::Followed => Ok(Json(FollowResponse { followed: true })),
        FollowOutcome::AlreadyFollowing => Ok(Json(FollowResponse { followed: false })),
        FollowOutcome::UnknownUser => Err(AppError::not_found("user not found")),
    }
}

#[derive(Serialize)]
pub struct UnfollowResponse {
    pub unfollowed: bool,
}

pub async fn unfollow_user(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnfollowResponse>, AppError> {
    if auth.user_id == id {
        return Err(AppError::bad_request("cannot unfollow yourself"));
    }

    let service = SocialService::new(state.db.clone());
    let unfollowed = service.unfollow(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, follower_id = %auth.user_id, following_id = %id, "failed to unfollow user");
        AppError::internal("failed to unfollow user")
    })?;

    Ok(Json(UnfollowResponse { unfollowed }))
}

#[derive(Serialize)]
pub struct SocialUserItem {
    pub user: PublicUser,
    #[serde(with = "time::serde::rfc3339")]
    pub followed_at: OffsetDateTime,
}

pub async fn list_followers(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<SocialUserItem>>, AppError> {
    let limit = list_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = SocialService::new(state.db.clone());
    let mut followers = service
        .list_followers(id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to list followers");
            AppError::internal("failed to list followers")
        })?;

    let next_cursor = split_page(&mut followers, limit, |edge| (edge.followed_at, edge.user.id));
    let items = followers
        .into_iter()
        .map(|edge| SocialUserItem {
            user: edge.user.into(),
            followed_at: edge.followed_at,
        })
        .collect();

    Ok(Json(ListResponse { items, next_cursor }))
}

pub async fn list_following(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<SocialUserItem>>, AppError> {
    let limit = list_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = SocialService::new(state.db.clone());
    let mut following = service
        .list_following(id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %id, "failed to list following");
            AppError::internal("failed to list following")
        })?;

    let next_cursor = split_page(&mut following, limit, |edge| (edge.followed_at, edge.user.id));
    let items = following
        .into_iter()
        .map(|edge| SocialUserItem {
            user: edge.user.into(),
            followed_at: edge.followed_at,
        })
        .collect();

    Ok(Json(ListResponse { items, next_cursor }))
}

#[derive(Serialize)]
pub struct RelationshipResponse {
    pub is_following: bool,
    pub is_followed_by: bool,
}

pub async fn relationship_status(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<RelationshipResponse>, AppError> {
    if auth.user_id == id {
        return Ok(Json(RelationshipResponse {
            is_following: false,
            is_followed_by: false,
        }));
    }

    let service = SocialService::new(state.db.clone());
    let status = service
        .relationship_status(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, viewer_id = %auth.user_id, other_id = %id, "failed to fetch relationship status");
            AppError::internal("failed to fetch relationship status")
        })?;

    Ok(Json(RelationshipResponse {
        is_following: status.is_following,
        is_followed_by: status.is_followed_by,
    }))
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let service = PostService::new(state.db.clone());
    let categories = service.list_categories().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list categories");
        AppError::internal("failed to list categories")
    })?;

    Ok(Json(categories))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub category: String,
    pub status: Option<PostStatus>,
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.is_empty() {
        return Err(AppError::bad_request("title cannot be empty"));
    }
    if char_len(title) > MAX_TITLE_LEN {
        return Err(AppError::bad_request("title must be at most 200 characters"));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::bad_request("content cannot be empty"));
    }
    if char_len(content) > MAX_CONTENT_LEN {
        return Err(AppError::bad_request("content must be at most 100000 characters"));
    }
    Ok(())
}

fn validate_post_extras(
    description: Option<&str>,
    image_url: Option<&str>,
) -> Result<(), AppError> {
    if let Some(description) = description {
        if char_len(description) > MAX_DESCRIPTION_LEN {
            return Err(AppError::bad_request(
                "description must be at most 500 characters",
            ));
        }
    }
    if let Some(image_url) = image_url {
        if !is_valid_link(image_url) {
            return Err(AppError::bad_request("image_url must be an http(s) URL"));
        }
    }
    Ok(())
}

async fn ensure_category(service: &PostService, category: &str) -> Result<(), AppError> {
    let exists = service.category_exists(category).await.map_err(|err| {
        tracing::error!(error = ?err, category = category, "failed to look up category");
        AppError::internal("failed to look up category")
    })?;
    if exists {
        Ok(())
    } else {
        Err(AppError::bad_request("unknown category"))
    }
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let title = payload.title.trim().to_string();
    validate_title(&title)?;
    validate_content(&payload.content)?;
    validate_post_extras(payload.description.as_deref(), payload.image_url.as_deref())?;

    let service = PostService::new(state.db.clone());
    ensure_category(&service, &payload.category).await?;

    let post = service
        .create_post(
            auth.user_id,
            NewPost {
                title,
                description: payload.description,
                content: payload.content,
                image_url: payload.image_url,
                category: payload.category,
                status: payload.status.unwrap_or(PostStatus::Draft),
            },
        )
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                return AppError::bad_request("unknown category");
            }
            tracing::error!(error = ?err, owner_id = %auth.user_id, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    Ok(Json(post))
}

pub async fn list_posts(
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

pub async fn get_post(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Post>, AppError> {
    let viewer_id = auth.map(|user| user.user_id);
    let service = PostService::new(state.db.clone());
    let post = service.get_post(id, viewer_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub category: Option<String>,
    pub status: Option<PostStatus>,
}

pub async fn update_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let title = payload.title.map(|title| title.trim().to_string());
    if let Some(title) = &title {
        validate_title(title)?;
    }
    if let Some(content) = &payload.content {
        validate_content(content)?;
    }
    validate_post_extras(
        payload.description.as_ref().and_then(Option::as_deref),
        payload.image_url.as_ref().and_then(Option::as_deref),
    )?;

    let service = PostService::new(state.db.clone());
    if let Some(category) = &payload.category {
        ensure_category(&service, category).await?;
    }

    let post = service
        .update_post(
            id,
            auth.user_id,
            PostUpdate {
                title,
                description: payload.description,
                content: payload.content,
                image_url: payload.image_url,
                category: payload.category,
                status: payload.status,
            },
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to update post");
            AppError::internal("failed to update post")
        })?;

    post.map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn delete_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone());
    let deleted = service.delete_post(id, auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %id, "failed to delete post");
        AppError::internal("failed to delete post")
    })?;

    if deleted {
        tracing::info!(post_id = %id, owner_id = %auth.user_id, "post deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

// ---------------------------------------------------------------------------
// Comments & claps
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ClapResponse {
    pub clapped: bool,
    pub claps: i64,
}

impl From<ClapOutcome> for ClapResponse {
    fn from(outcome: ClapOutcome) -> Self {
        Self {
            clapped: outcome.changed,
            claps: outcome.claps,
        }
    }
}

#[derive(Serialize)]
pub struct UnclapResponse {
    pub removed: bool,
    pub claps: i64,
}

impl From<ClapOutcome> for UnclapResponse {
    fn from(outcome: ClapOutcome) -> Self {
        Self {
            removed: outcome.changed,
            claps: outcome.claps,
        }
    }
}

pub async fn post_claps(
    Path(id): Path<Uuid>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<ClapSummary>, AppError> {
    let viewer_id = auth.map(|user| user.user_id);
    let service = EngagementService::new(state.db.clone());
    let summary = service
        .post_clap_summary(id, viewer_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to count claps");
            AppError::internal("failed to count claps")
        })?;

    summary
        .map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn clap_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ClapResponse>, AppError> {
    let service = EngagementService::new(state.db.clone());
    let outcome = service.clap_post(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, post_id = %id, "failed to clap post");
        AppError::internal("failed to clap post")
    })?;

    outcome
        .map(|outcome| Json(outcome.into()))
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn unclap_post(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnclapResponse>, AppError> {
    let service = EngagementService::new(state.db.clone());
    let outcome = service.unclap_post(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, post_id = %id, "failed to remove clap");
        AppError::internal("failed to remove clap")
    })?;

    Ok(Json(outcome.into()))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

pub async fn create_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let body = payload.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::bad_request("comment cannot be empty"));
    }
    if char_len(&body) > MAX_COMMENT_LEN {
        return Err(AppError::bad_request("comment must be at most 5000 characters"));
    }

    let service = EngagementService::new(state.db.clone());
    let comment = service
        .add_comment(auth.user_id, id, body)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, post_id = %id, "failed to comment");
            AppError::internal("failed to create comment")
        })?;

    comment
        .map(Json)
        .ok_or_else(|| AppError::not_found("post not found"))
}

pub async fn list_comments(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Comment>>, AppError> {
    let limit = list_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = EngagementService::new(state.db.clone());
    let mut comments = service
        .list_comments(id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = %id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?
        .ok_or_else(|| AppError::not_found("post not found"))?;

    let next_cursor = split_page(&mut comments, limit, |comment| {
        (comment.created_at, comment.id)
    });

    Ok(Json(ListResponse {
        items: comments,
        next_cursor,
    }))
}

pub async fn delete_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = EngagementService::new(state.db.clone());
    let deleted = service
        .delete_comment(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = %id, "failed to delete comment");
            AppError::internal("failed to delete comment")
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

pub async fn clap_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ClapResponse>, AppError> {
    let service = EngagementService::new(state.db.clone());
    let outcome = service.clap_comment(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, comment_id = %id, "failed to clap comment");
        AppError::internal("failed to clap comment")
    })?;

    outcome
        .map(|outcome| Json(outcome.into()))
        .ok_or_else(|| AppError::not_found("comment not found"))
}

pub async fn unclap_comment(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnclapResponse>, AppError> {
    let service = EngagementService::new(state.db.clone());
    let outcome = service
        .unclap_comment(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, comment_id = %id, "failed to remove comment clap");
            AppError::internal("failed to remove clap")
        })?;

    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub expires_in_days: Option<i64>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct CreateApiKeyResponse {
    pub key: ApiKey,
    pub secret: String,
}

pub async fn create_api_key(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name cannot be empty"));
    }
    if char_len(&name) > MAX_KEY_NAME_LEN {
        return Err(AppError::bad_request("name must be at most 100 characters"));
    }
    if let Some(days) = payload.expires_in_days {
        if !(1..=MAX_KEY_TTL_DAYS).contains(&days) {
            return Err(AppError::bad_request(
                "expires_in_days must be between 1 and 365",
            ));
        }
    }
    let permissions = payload
        .permissions
        .unwrap_or_else(|| vec!["read".to_string()]);
    if permissions.iter().any(|permission| !is_valid_permission(permission)) {
        return Err(AppError::bad_request("invalid permission name"));
    }

    let service = ApiKeyService::new(state.db.clone());
    let outcome = service
        .create(
            auth.user_id,
            NewApiKey {
                name,
                expires_in_days: payload.expires_in_days,
                permissions,
            },
            state.api_keys_per_user,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to create api key");
            AppError::internal("failed to create api key")
        })?;

    match outcome {
        CreateKeyOutcome::Created { key, secret } => {
            Ok(Json(CreateApiKeyResponse { key, secret }))
        }
        CreateKeyOutcome::LimitReached => Err(AppError::conflict("api key limit reached")),
    }
}

pub async fn list_api_keys(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    let service = ApiKeyService::new(state.db.clone());
    let keys = service.list(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list api keys");
        AppError::internal("failed to list api keys")
    })?;

    Ok(Json(keys))
}

pub async fn revoke_api_key(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = ApiKeyService::new(state.db.clone());
    let revoked = service.revoke(auth.user_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, key_id = %id, "failed to revoke api key");
        AppError::internal("failed to revoke api key")
    })?;

    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("api key not found"))
    }
}
