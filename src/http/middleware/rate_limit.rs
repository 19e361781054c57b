use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::rate_limiter::{RateLimitInfo, RateLimiter};
use crate::domain::api_key::ApiPrincipal;
use crate::http::AppError;
use crate::AppState;

pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(info.limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(info.remaining));
    headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(info.reset_at));
}

/// Fixed-window quota per API key. Must run after `require_api_key`.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key_id = match request.extensions().get::<ApiPrincipal>() {
        Some(principal) => principal.key_id,
        None => return AppError::unauthorized("missing api key").into_response(),
    };

    let limiter = RateLimiter::new(state.cache.clone(), state.rate_limit);
    let info = match limiter.check(key_id).await {
        Ok(info) => info,
        Err(err) => {
            tracing::error!(error = ?err, key_id = %key_id, "failed to check rate limit");
            return AppError::internal("failed to check rate limit").into_response();
        }
    };

    if info.limited {
        tracing::warn!(key_id = %key_id, limit = info.limit, "api key rate limit exceeded");
        let mut response =
            AppError::rate_limited("rate limit exceeded", info.reset_at).into_response();
        apply_headers(response.headers_mut(), &info);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &info);
    response
}
