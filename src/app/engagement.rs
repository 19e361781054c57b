use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::engagement::{ClapSummary, Comment};
use crate::infra::db::Db;

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.user_id, u.username AS author_username, c.body, c.created_at, \
     (SELECT COUNT(*) FROM comment_claps cc WHERE cc.comment_id = c.id) AS claps";

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        author_username: row.get("author_username"),
        body: row.get("body"),
        created_at: row.get("created_at"),
        claps: row.get("claps"),
    }
}

/// Result of a clap or unclap: whether anything changed, and the new tally.
#[derive(Debug, Clone, Copy)]
pub struct ClapOutcome {
    pub changed: bool,
    pub claps: i64,
}

#[derive(Clone)]
pub struct EngagementService {
    db: Db,
}

impl EngagementService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn post_is_published(&self, post_id: Uuid) -> Result<bool> {
        let published: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1 AND status = 'published')",
        )
        .bind(post_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(published)
    }

    async fn comment_is_visible(&self, comment_id: Uuid) -> Result<bool> {
        let visible: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                SELECT 1 FROM comments c JOIN posts p ON p.id = c.post_id \
                WHERE c.id = $1 AND p.status = 'published' \
             )",
        )
        .bind(comment_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(visible)
    }

    /// Returns `None` when the post does not exist or is not published.
    pub async fn add_comment(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        body: String,
    ) -> Result<Option<Comment>> {
        let row = sqlx::query(&format!(
            "WITH c AS ( \
                INSERT INTO comments (user_id, post_id, body) \
                SELECT $1, $2, $3 \
                WHERE EXISTS (SELECT 1 FROM posts WHERE id = $2 AND status = 'published') \
                RETURNING * \
             ) \
             SELECT {COMMENT_COLUMNS} FROM c JOIN users u ON u.id = c.user_id"
        ))
        .bind(user_id)
        .bind(post_id)
        .bind(body)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Returns `None` when the post does not exist or is not published.
    pub async fn list_comments(
        &self,
        post_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Option<Vec<Comment>>> {
        if !self.post_is_published(post_id).await? {
            return Ok(None);
        }

        let rows = match cursor {
            Some((created_at, comment_id)) => {
                sqlx::query(&format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.user_id \
                     WHERE c.post_id = $1 \
                       AND (c.created_at < $2 OR (c.created_at = $2 AND c.id < $3)) \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $4"
                ))
                .bind(post_id)
                .bind(created_at)
                .bind(comment_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.user_id \
                     WHERE c.post_id = $1 \
                     ORDER BY c.created_at DESC, c.id DESC \
                     LIMIT $2"
                ))
                .bind(post_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(Some(rows.iter().map(comment_from_row).collect()))
    }

    /// The comment author and the post owner may both delete a comment.
    pub async fn delete_comment(&self, comment_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM comments c USING posts p \
             WHERE c.id = $1 AND p.id = c.post_id \
               AND (c.user_id = $2 OR p.owner_id = $2)",
        )
        .bind(comment_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clap_post(&self, user_id: Uuid, post_id: Uuid) -> Result<Option<ClapOutcome>> {
        if !self.post_is_published(post_id).await? {
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO post_claps (user_id, post_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(post_id)
        .execute(self.db.pool())
        .await?;

        let claps = self.count_post_claps(post_id).await?;
        Ok(Some(ClapOutcome {
            changed: result.rows_affected() > 0,
            claps,
        }))
    }

    pub async fn unclap_post(&self, user_id: Uuid, post_id: Uuid) -> Result<ClapOutcome> {
        let result = sqlx::query("DELETE FROM post_claps WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(self.db.pool())
            .await?;

        let claps = self.count_post_claps(post_id).await?;
        Ok(ClapOutcome {
            changed: result.rows_affected() > 0,
            claps,
        })
    }

    pub async fn post_clap_summary(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Option<ClapSummary>> {
        if !self.post_is_published(post_id).await? {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT COUNT(*) AS claps, \
                    COALESCE(BOOL_OR(user_id = $2), false) AS clapped_by_viewer \
             FROM post_claps WHERE post_id = $1",
        )
        .bind(post_id)
        .bind(viewer_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(Some(ClapSummary {
            claps: row.get("claps"),
            clapped_by_viewer: row.get("clapped_by_viewer"),
        }))
    }

    pub async fn clap_comment(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<ClapOutcome>> {
        if !self.comment_is_visible(comment_id).await? {
            return Ok(None);
        }

        let result = sqlx::query(
            "INSERT INTO comment_claps (user_id, comment_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(comment_id)
        .execute(self.db.pool())
        .await?;

        let claps = self.count_comment_claps(comment_id).await?;
        Ok(Some(ClapOutcome {
            changed: result.rows_affected() > 0,
            claps,
        }))
    }

    pub async fn unclap_comment(&self, user_id: Uuid, comment_id: Uuid) -> Result<ClapOutcome> {
        let result =
            sqlx::query("DELETE FROM comment_claps WHERE user_id = $1 AND comment_id = $2")
                .bind(user_id)
                .bind(comment_id)
                .execute(self.db.pool())
                .await?;

        let claps = self.count_comment_claps(comment_id).await?;
        Ok(ClapOutcome {
            changed: result.rows_affected() > 0,
            claps,
        })
    }

    async fn count_post_claps(&self, post_id: Uuid) -> Result<i64> {
        let claps: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_claps WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(claps)
    }

    async fn count_comment_claps(&self, comment_id: Uuid) -> Result<i64> {
        let claps: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comment_claps WHERE comment_id = $1")
                .bind(comment_id)
                .fetch_one(self.db.pool())
                .await?;
        Ok(claps)
    }
}
