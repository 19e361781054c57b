use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Stored API key metadata. The secret itself is only kept as a digest.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub permissions: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub revoked: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ApiKey {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|expires| expires <= now).unwrap_or(false)
    }
}

/// Identity attached to a request that presented a valid API key.
#[derive(Debug, Clone)]
pub struct ApiPrincipal {
    pub key_id: Uuid,
    pub user_id: Uuid,
}
