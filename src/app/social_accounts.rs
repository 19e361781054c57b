use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::social_account::{SiteSocialAccount, UserSocialAccount};
use crate::infra::db::Db;

const MAX_PLATFORM_LEN: usize = 32;

/// Platform names are short lowercase identifiers such as `github` or `x`.
pub fn is_valid_platform(platform: &str) -> bool {
    !platform.is_empty()
        && platform.len() <= MAX_PLATFORM_LEN
        && platform
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
}

/// Absolute http(s) URL with a host.
pub fn is_valid_link(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

#[derive(Clone)]
pub struct SocialAccountService {
    db: Db,
}

impl SocialAccountService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UserSocialAccount>> {
        let rows = sqlx::query(
            "SELECT user_id, platform, url, updated_at \
             FROM user_social_accounts WHERE user_id = $1 ORDER BY platform",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserSocialAccount {
                user_id: row.get("user_id"),
                platform: row.get("platform"),
                url: row.get("url"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    pub async fn upsert_for_user(
        &self,
        user_id: Uuid,
        platform: &str,
        url: &str,
    ) -> Result<UserSocialAccount> {
        let row = sqlx::query(
            "INSERT INTO user_social_accounts (user_id, platform, url) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, platform) DO UPDATE SET url = EXCLUDED.url, updated_at = now() \
             RETURNING user_id, platform, url, updated_at",
        )
        .bind(user_id)
        .bind(platform)
        .bind(url)
        .fetch_one(self.db.pool())
        .await?;

        Ok(UserSocialAccount {
            user_id: row.get("user_id"),
            platform: row.get("platform"),
            url: row.get("url"),
            updated_at: row.get("updated_at"),
        })
    }

    pub async fn remove_for_user(&self, user_id: Uuid, platform: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM user_social_accounts WHERE user_id = $1 AND platform = $2")
                .bind(user_id)
                .bind(platform)
                .execute(self.db.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_site(&self) -> Result<Vec<SiteSocialAccount>> {
        let rows = sqlx::query(
            "SELECT platform, url, updated_at FROM site_social_accounts ORDER BY platform",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SiteSocialAccount {
                platform: row.get("platform"),
                url: row.get("url"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    pub async fn upsert_site(&self, platform: &str, url: &str) -> Result<SiteSocialAccount> {
        let row = sqlx::query(
            "INSERT INTO site_social_accounts (platform, url) VALUES ($1, $2) \
             ON CONFLICT (platform) DO UPDATE SET url = EXCLUDED.url, updated_at = now() \
             RETURNING platform, url, updated_at",
        )
        .bind(platform)
        .bind(url)
        .fetch_one(self.db.pool())
        .await?;

        Ok(SiteSocialAccount {
            platform: row.get("platform"),
            url: row.get("url"),
            updated_at: row.get("updated_at"),
        })
    }
}
