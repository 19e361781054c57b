pub mod rate_limits;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::rate_limits::RateLimitPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    /// `0` discards idle connections on acquire.
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
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

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = var_or("HTTP_ADDR", "0.0.0.0:8080");
        SocketAddr::from_str(&http_addr)
            .with_context(|| format!("invalid HTTP_ADDR {http_addr:?}"))?;

        let rate_limit = RateLimitPolicy::new(
            positive_or("RATE_LIMIT_MAX", 100u32)?,
            positive_or("RATE_LIMIT_WINDOW_SECONDS", 60u64)?,
        );

        Ok(Self {
            http_addr,
            database_url: required("DATABASE_URL")?,
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1/"),
            db_max_connections: positive_or("DB_MAX_CONNECTIONS", 25u32)?,
            db_connect_timeout_seconds: parse_or("DB_CONNECT_TIMEOUT_SECONDS", 5)?,
            db_idle_timeout_seconds: parse_or("DB_IDLE_TIMEOUT_SECONDS", 300)?,
            db_max_lifetime_seconds: parse_or("DB_MAX_LIFETIME_SECONDS", 1800)?,
            admin_token: optional("ADMIN_TOKEN"),
            paseto_access_key: secret_key("PASETO_ACCESS_KEY")?,
            paseto_refresh_key: secret_key("PASETO_REFRESH_KEY")?,
            access_ttl_minutes: positive_or("ACCESS_TTL_MINUTES", 15u64)?,
            refresh_ttl_days: positive_or("REFRESH_TTL_DAYS", 30u64)?,
            rate_limit,
            api_keys_per_user: positive_or("API_KEYS_PER_USER", 10i64)?,
            cors_allowed_origin: optional("CORS_ALLOWED_ORIGIN"),
            request_body_limit_bytes: parse_or("REQUEST_BODY_LIMIT_BYTES", 1024 * 1024)?,
        })
    }
}

/// Unset and blank are treated the same.
fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| anyhow!("missing required env var: {key}"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key}: {err}")),
        None => Ok(default),
    }
}

fn positive_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parse_or(key, default)?;
    if value <= T::default() {
        bail!("invalid {key}: must be positive");
    }
    Ok(value)
}

/// Base64 (standard alphabet) encoding of exactly 32 bytes.
fn secret_key(key: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(required(key)?.trim())
        .map_err(|err| anyhow!("invalid {key}: {err}"))?;
    <[u8; 32]>::try_from(decoded.as_slice())
        .map_err(|_| anyhow!("invalid {key}: expected 32 bytes, got {}", decoded.len()))
}
