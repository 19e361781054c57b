use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::user::{PublicUser, User};
use crate::infra::db::Db;

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, name, bio, image_url, created_at, updated_at";

pub(crate) const JOINED_USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.name, u.bio, u.image_url, u.created_at, u.updated_at";

pub(crate) fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        name: row.get("name"),
        bio: row.get("bio"),
        image_url: row.get("image_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Public profile with follower, following and published post counts.
    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<PublicUser>> {
        let row = sqlx::query(&format!(
            "SELECT {JOINED_USER_COLUMNS}, \
                    (SELECT COUNT(*) FROM follows WHERE following_id = u.id) AS followers_count, \
                    (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS following_count, \
                    (SELECT COUNT(*) FROM posts WHERE owner_id = u.id AND status = 'published') AS posts_count \
             FROM users u WHERE u.id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        let profile = row.map(|row| {
            PublicUser::with_counts(
                user_from_row(&row),
                row.get("followers_count"),
                row.get("following_count"),
                row.get("posts_count"),
            )
        });

        Ok(profile)
    }

    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 bio = COALESCE($3, bio), \
                 image_url = COALESCE($4, image_url), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(update.name)
        .bind(update.bio)
        .bind(update.image_url)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }
}
