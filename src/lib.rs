pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use crate::app::auth::AuthService;
use crate::config::rate_limits::RateLimitPolicy;
use crate::config::AppConfig;
use crate::infra::{cache::RedisCache, db::Db};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub paseto_refresh_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub refresh_ttl_days: u64,
    pub rate_limit: RateLimitPolicy,
    pub api_keys_per_user: i64,
    pub cors_allowed_origin: Option<String>,
    pub request_body_limit_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, db: Db, cache: RedisCache) -> Self {
        Self {
            db,
            cache,
            admin_token: config.admin_token.clone(),
            paseto_access_key: config.paseto_access_key,
            paseto_refresh_key: config.paseto_refresh_key,
            access_ttl_minutes: config.access_ttl_minutes,
            refresh_ttl_days: config.refresh_ttl_days,
            rate_limit: config.rate_limit,
            api_keys_per_user: config.api_keys_per_user,
            cors_allowed_origin: config.cors_allowed_origin.clone(),
            request_body_limit_bytes: config.request_body_limit_bytes,
        }
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.db.clone(),
            self.paseto_access_key,
            self.paseto_refresh_key,
            self.access_ttl_minutes,
            self.refresh_ttl_days,
        )
    }
}
