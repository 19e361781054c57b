use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::app::api_keys::{ApiKeyCheck, ApiKeyService};
use crate::http::auth::bearer_token;
use crate::http::AppError;
use crate::AppState;

pub const API_USER_ID_HEADER: HeaderName = HeaderName::from_static("x-api-user-id");
pub const API_KEY_ID_HEADER: HeaderName = HeaderName::from_static("x-api-key-id");

/// Validates the bearer API key on versioned routes.
///
/// On success the caller's `ApiPrincipal` is placed in the request extensions
/// and the owner and key ids are stamped onto the request headers.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Client-supplied identity headers are never trusted.
    request.headers_mut().remove(API_USER_ID_HEADER);
    request.headers_mut().remove(API_KEY_ID_HEADER);

    let token = bearer_token(request.headers())?.to_owned();

    let service = ApiKeyService::new(state.db.clone());
    let check = service.authenticate(&token).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to validate api key");
        AppError::internal("failed to validate api key")
    })?;

    let principal = match check {
        ApiKeyCheck::Valid(principal) => principal,
        ApiKeyCheck::Unknown => return Err(AppError::unauthorized("invalid api key")),
        ApiKeyCheck::Revoked => return Err(AppError::unauthorized("api key has been revoked")),
        ApiKeyCheck::Expired => return Err(AppError::unauthorized("api key has expired")),
    };

    let headers = request.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&principal.user_id.to_string()) {
        headers.insert(API_USER_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&principal.key_id.to_string()) {
        headers.insert(API_KEY_ID_HEADER, value);
    }

    tracing::debug!(key_id = %principal.key_id, user_id = %principal.user_id, "api key accepted");
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
