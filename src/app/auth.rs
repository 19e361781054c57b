use anyhow::{anyhow, Context, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sha2::{Digest, Sha256};
use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::users::{user_from_row, USER_COLUMNS};
use crate::domain::user::User;
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "collabchron";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: OffsetDateTime,
    pub refresh_expires_at: OffsetDateTime,
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_claim(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Identity carried by a token that decrypted and validated.
struct VerifiedToken {
    user_id: Uuid,
    token_id: Option<Uuid>,
}

/// PASETO v4.local keys and lifetimes, one per token kind.
#[derive(Clone)]
struct TokenKeys {
    access: [u8; 32],
    refresh: [u8; 32],
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    fn key(&self, kind: TokenKind) -> Result<SymmetricKey<V4>> {
        let bytes = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };
        Ok(SymmetricKey::<V4>::from(bytes)?)
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn seal(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        token_id: Option<Uuid>,
    ) -> Result<(String, OffsetDateTime)> {
        let ttl = self.ttl(kind);
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let std_ttl = std::time::Duration::try_from(ttl).context("token ttl out of range")?;

        let mut claims = Claims::new_expires_in(&std_ttl)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&user_id.to_string())?;
        claims.add_additional("typ", kind.as_claim())?;
        if let Some(id) = token_id {
            claims.token_identifier(&id.to_string())?;
        }

        let token = local::encrypt(&self.key(kind)?, &claims, None, None)?;
        Ok((token, expires_at))
    }

    /// `None` for anything that fails to decrypt, is expired, or has the
    /// wrong issuer, audience or kind.
    fn open(&self, kind: TokenKind, token: &str) -> Result<Option<VerifiedToken>> {
        let Ok(untrusted) = UntrustedToken::<Local, V4>::try_from(token) else {
            return Ok(None);
        };
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let Ok(trusted) = local::decrypt(&self.key(kind)?, &untrusted, &rules, None, None) else {
            return Ok(None);
        };
        let Some(claims) = trusted.payload_claims() else {
            return Ok(None);
        };
        if string_claim(claims, "typ") != Some(kind.as_claim()) {
            return Ok(None);
        }

        let Some(user_id) = string_claim(claims, "sub").and_then(|sub| Uuid::parse_str(sub).ok())
        else {
            return Ok(None);
        };
        let token_id = string_claim(claims, "jti").and_then(|jti| Uuid::parse_str(jti).ok());
        Ok(Some(VerifiedToken { user_id, token_id }))
    }
}

fn string_claim<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get_claim(name).and_then(|value| value.as_str())
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(
        db: Db,
        access_key: [u8; 32],
        refresh_key: [u8; 32],
        access_ttl_minutes: u64,
        refresh_ttl_days: u64,
    ) -> Self {
        let keys = TokenKeys {
            access: access_key,
            refresh: refresh_key,
            access_ttl: Duration::minutes(access_ttl_minutes as i64),
            refresh_ttl: Duration::days(refresh_ttl_days as i64),
        };
        Self { db, keys }
    }

    pub async fn signup(&self, new_user: NewUser) -> Result<User> {
        let password_hash = hash_password(&new_user.password)?;
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, name, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(new_user.email.to_lowercase())
        .bind(&new_user.name)
        .bind(password_hash)
        .fetch_one(self.db.pool())
        .await?;

        let user = user_from_row(&row);
        tracing::info!(user_id = %user.id, username = %user.username, "user signed up");
        Ok(user)
    }

    /// Accepts either the username or the email as `identifier`.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Option<TokenPair>> {
        let credentials: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, password_hash FROM users \
             WHERE username = $1 OR email = lower($1)",
        )
        .bind(identifier)
        .fetch_optional(self.db.pool())
        .await?;

        let Some((user_id, stored_hash)) = credentials else {
            return Ok(None);
        };
        if stored_hash.is_empty() || !verify_password(password, &stored_hash)? {
            tracing::debug!(user_id = %user_id, "login rejected");
            return Ok(None);
        }

        self.issue_token_pair(user_id).await.map(Some)
    }

    /// Rotates a refresh token. The presented token is revoked and linked to
    /// its replacement in the same transaction.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>> {
        let Some((user_id, refresh_id)) = self.refresh_identity(refresh_token)? else {
            return Ok(None);
        };

        let mut tx = self.db.pool().begin().await?;
        let live: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM refresh_tokens \
             WHERE id = $1 AND user_id = $2 AND token_hash = $3 \
               AND revoked_at IS NULL AND expires_at > now() \
             FOR UPDATE",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(hash_token(refresh_token))
        .fetch_optional(&mut *tx)
        .await?;

        if live.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let (replacement_id, pair) = self.store_token_pair(user_id, &mut tx).await?;
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now(), replaced_by = $2 \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(refresh_id)
        .bind(replacement_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(pair))
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let Some((user_id, refresh_id)) = self.refresh_identity(refresh_token)? else {
            return Ok(false);
        };

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE id = $1 AND user_id = $2 AND token_hash = $3 AND revoked_at IS NULL",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(hash_token(refresh_token))
        .execute(self.db.pool())
        .await?
        .rows_affected();

        Ok(revoked > 0)
    }

    pub fn authenticate_access_token(&self, token: &str) -> Result<Option<AuthSession>> {
        Ok(self
            .keys
            .open(TokenKind::Access, token)?
            .map(|verified| AuthSession {
                user_id: verified.user_id,
            }))
    }

    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair> {
        let mut tx = self.db.pool().begin().await?;
        let (_, pair) = self.store_token_pair(user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(pair)
    }

    fn refresh_identity(&self, token: &str) -> Result<Option<(Uuid, Uuid)>> {
        Ok(self
            .keys
            .open(TokenKind::Refresh, token)?
            .and_then(|verified| verified.token_id.map(|id| (verified.user_id, id))))
    }

    /// Seals both tokens and records the refresh token's digest. Returns the
    /// new refresh token id with the pair.
    async fn store_token_pair(
        &self,
        user_id: Uuid,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(Uuid, TokenPair)> {
        let refresh_id = Uuid::new_v4();
        let (access_token, access_expires_at) =
            self.keys.seal(TokenKind::Access, user_id, None)?;
        let (refresh_token, refresh_expires_at) =
            self.keys.seal(TokenKind::Refresh, user_id, Some(refresh_id))?;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(refresh_id)
        .bind(user_id)
        .bind(hash_token(&refresh_token))
        .bind(refresh_expires_at)
        .execute(&mut **tx)
        .await?;

        Ok((
            refresh_id,
            TokenPair {
                access_token,
                refresh_token,
                access_expires_at,
                refresh_expires_at,
            },
        ))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("password hashing failed: {err}"))
}

fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|err| anyhow!("stored password hash invalid: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hex SHA-256 digest used for refresh tokens and API keys at rest.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
