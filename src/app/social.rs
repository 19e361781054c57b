use anyhow::Result;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::users::{user_from_row, JOINED_USER_COLUMNS};
use crate::domain::user::User;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct SocialService {
    db: Db,
}

#[derive(Debug, Clone)]
pub struct SocialUserEdge {
    pub user: User,
    pub followed_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct RelationshipStatus {
    pub is_following: bool,
    pub is_followed_by: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    UnknownUser,
}

impl SocialService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Creates the follow edge. The primary key keeps edges unique per pair.
    pub async fn follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<FollowOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let target: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(following_id)
            .fetch_optional(&mut *tx)
            .await?;
        if target.is_none() {
            tx.rollback().await?;
            return Ok(FollowOutcome::UnknownUser);
        }

        let result = sqlx::query(
            "INSERT INTO follows (follower_id, following_id) \
             SELECT $1, $2 \
             WHERE $1 <> $2 \
             ON CONFLICT DO NOTHING",
        )
        .bind(follower_id)
        .bind(following_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() > 0 {
            tracing::debug!(follower_id = %follower_id, following_id = %following_id, "follow created");
            Ok(FollowOutcome::Followed)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    pub async fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
                .bind(follower_id)
                .bind(following_id)
                .execute(self.db.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_followers(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<SocialUserEdge>> {
        self.list_edges(EdgeDirection::Followers, user_id, cursor, limit)
            .await
    }

    pub async fn list_following(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<SocialUserEdge>> {
        self.list_edges(EdgeDirection::Following, user_id, cursor, limit)
            .await
    }

    async fn list_edges(
        &self,
        direction: EdgeDirection,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<SocialUserEdge>> {
        // (anchor column matching user_id, column holding the listed user)
        let (anchor, other) = match direction {
            EdgeDirection::Followers => ("following_id", "follower_id"),
            EdgeDirection::Following => ("follower_id", "following_id"),
        };

        let rows = match cursor {
            Some((created_at, other_id)) => {
                sqlx::query(&format!(
                    "SELECT {JOINED_USER_COLUMNS}, f.created_at AS followed_at \
                     FROM follows f \
                     JOIN users u ON u.id = f.{other} \
                     WHERE f.{anchor} = $1 \
                       AND (f.created_at < $2 OR (f.created_at = $2 AND f.{other} < $3)) \
                     ORDER BY f.created_at DESC, f.{other} DESC \
                     LIMIT $4"
                ))
                .bind(user_id)
                .bind(created_at)
                .bind(other_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {JOINED_USER_COLUMNS}, f.created_at AS followed_at \
                     FROM follows f \
                     JOIN users u ON u.id = f.{other} \
                     WHERE f.{anchor} = $1 \
                     ORDER BY f.created_at DESC, f.{other} DESC \
                     LIMIT $2"
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| SocialUserEdge {
                user: user_from_row(&row),
                followed_at: row.get("followed_at"),
            })
            .collect())
    }

    pub async fn relationship_status(
        &self,
        viewer_id: Uuid,
        other_id: Uuid,
    ) -> Result<RelationshipStatus> {
        let row = sqlx::query(
            "SELECT \
                EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2) AS is_following, \
                EXISTS (SELECT 1 FROM follows WHERE follower_id = $2 AND following_id = $1) AS is_followed_by",
        )
        .bind(viewer_id)
        .bind(other_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(RelationshipStatus {
            is_following: row.get("is_following"),
            is_followed_by: row.get("is_followed_by"),
        })
    }
}

#[derive(Clone, Copy)]
enum EdgeDirection {
    Followers,
    Following,
}
