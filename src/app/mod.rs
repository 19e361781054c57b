pub mod analytics;
pub mod api_keys;
pub mod auth;
pub mod engagement;
pub mod posts;
pub mod rate_limiter;
pub mod social;
pub mod social_accounts;
pub mod users;
