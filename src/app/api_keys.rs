use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::auth::hash_token;
use crate::domain::api_key::{ApiKey, ApiPrincipal};
use crate::infra::db::Db;

pub const KEY_PREFIX: &str = "cc_";
const KEY_RANDOM_LEN: usize = 40;
const DISPLAY_PREFIX_LEN: usize = 10;

const API_KEY_COLUMNS: &str = "id, user_id, name, key_prefix, permissions, expires_at, revoked, \
     revoked_at, last_used_at, created_at";

fn api_key_from_row(row: &PgRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        key_prefix: row.get("key_prefix"),
        permissions: row.get("permissions"),
        expires_at: row.get("expires_at"),
        revoked: row.get("revoked"),
        revoked_at: row.get("revoked_at"),
        last_used_at: row.get("last_used_at"),
        created_at: row.get("created_at"),
    }
}

/// Fresh opaque key: fixed prefix followed by random alphanumerics.
pub fn generate_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", KEY_PREFIX, random)
}

const MAX_PERMISSION_LEN: usize = 64;

/// Permission names are lowercase scopes such as `read` or `posts:read`.
pub fn is_valid_permission(permission: &str) -> bool {
    !permission.is_empty()
        && permission.len() <= MAX_PERMISSION_LEN
        && permission
            .chars()
            .all(|ch| {
                ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-' | ':')
            })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Active,
    Revoked,
    Expired,
}

/// Revocation wins over expiry when both apply.
pub fn key_state(key: &ApiKey, now: OffsetDateTime) -> KeyState {
    if key.revoked {
        KeyState::Revoked
    } else if key.is_expired_at(now) {
        KeyState::Expired
    } else {
        KeyState::Active
    }
}

#[derive(Debug, Clone)]
pub enum ApiKeyCheck {
    Valid(ApiPrincipal),
    Unknown,
    Revoked,
    Expired,
}

pub struct NewApiKey {
    pub name: String,
    pub expires_in_days: Option<i64>,
    pub permissions: Vec<String>,
}

pub enum CreateKeyOutcome {
    /// The plaintext secret is only available here.
    Created { key: ApiKey, secret: String },
    LimitReached,
}

#[derive(Clone)]
pub struct ApiKeyService {
    db: Db,
}

impl ApiKeyService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        new_key: NewApiKey,
        max_active: i64,
    ) -> Result<CreateKeyOutcome> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_keys \
             WHERE user_id = $1 AND NOT revoked \
               AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if active >= max_active {
            tx.rollback().await?;
            return Ok(CreateKeyOutcome::LimitReached);
        }

        let secret = generate_key();
        let expires_at = new_key
            .expires_in_days
            .map(|days| OffsetDateTime::now_utc() + Duration::days(days));

        let row = sqlx::query(&format!(
            "INSERT INTO api_keys (user_id, name, key_prefix, key_hash, permissions, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(user_id)
        .bind(new_key.name)
        .bind(&secret[..DISPLAY_PREFIX_LEN])
        .bind(hash_token(&secret))
        .bind(new_key.permissions)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let key = api_key_from_row(&row);
        tracing::info!(key_id = %key.id, user_id = %user_id, "api key created");
        Ok(CreateKeyOutcome::Created { key, secret })
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(api_key_from_row).collect())
    }

    /// Marks the key revoked. Revoking twice keeps the first timestamp.
    pub async fn revoke(&self, user_id: Uuid, key_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE api_keys \
             SET revoked = true, revoked_at = COALESCE(revoked_at, now()) \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(key_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(key_id = %key_id, user_id = %user_id, "api key revoked");
        }
        Ok(result.rows_affected() > 0)
    }

    /// Resolves a bearer token to its owner and stamps `last_used_at`.
    pub async fn authenticate(&self, token: &str) -> Result<ApiKeyCheck> {
        if !token.starts_with(KEY_PREFIX) {
            return Ok(ApiKeyCheck::Unknown);
        }

        let row = sqlx::query(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1"
        ))
        .bind(hash_token(token))
        .fetch_optional(self.db.pool())
        .await?;

        let key = match row {
            Some(row) => api_key_from_row(&row),
            None => return Ok(ApiKeyCheck::Unknown),
        };

        match key_state(&key, OffsetDateTime::now_utc()) {
            KeyState::Revoked => return Ok(ApiKeyCheck::Revoked),
            KeyState::Expired => return Ok(ApiKeyCheck::Expired),
            KeyState::Active => {}
        }

        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(key.id)
            .execute(self.db.pool())
            .await?;

        Ok(ApiKeyCheck::Valid(ApiPrincipal {
            key_id: key.id,
            user_id: key.user_id,
        }))
    }
}
