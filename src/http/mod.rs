use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod auth;
mod error;
mod extract;
mod handlers;
pub mod middleware;
mod public_api;
mod routes;

pub use auth::{AdminToken, ApiKeyUser, AuthUser};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let public_api = routes::public_api()
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        ));

    let cors = cors_layer(state.cors_allowed_origin.as_deref());

    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::users())
        .merge(routes::social())
        .merge(routes::posts())
        .merge(routes::engagement())
        .merge(routes::api_keys())
        .merge(routes::site())
        .nest("/api/v1", public_api)
        .layer(RequestBodyLimitLayer::new(state.request_body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let Some(origin) = allowed_origin else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(err) => {
            tracing::error!(error = %err, origin = origin, "invalid CORS origin; denying cross-origin requests");
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}
