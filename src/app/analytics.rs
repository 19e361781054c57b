use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::stats::UserStats;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct AnalyticsService {
    db: Db,
}

impl AnalyticsService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Claps and comments count what the author's posts received.
    pub async fn user_stats(&self, user_id: Uuid) -> Result<UserStats> {
        let row = sqlx::query(
            "SELECT \
                (SELECT COUNT(*) FROM posts WHERE owner_id = $1) AS total_posts, \
                (SELECT COUNT(*) FROM posts WHERE owner_id = $1 AND status = 'published') AS published_posts, \
                (SELECT COALESCE(SUM(views), 0)::BIGINT FROM posts WHERE owner_id = $1) AS total_views, \
                (SELECT COUNT(*) FROM post_claps pc JOIN posts p ON p.id = pc.post_id \
                  WHERE p.owner_id = $1) AS total_claps, \
                (SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id \
                  WHERE p.owner_id = $1) AS total_comments, \
                (SELECT COUNT(*) FROM follows WHERE following_id = $1) AS followers, \
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        let total_posts: i64 = row.get("total_posts");
        let published_posts: i64 = row.get("published_posts");

        Ok(UserStats {
            total_posts,
            published_posts,
            draft_posts: total_posts - published_posts,
            total_views: row.get("total_views"),
            total_claps: row.get("total_claps"),
            total_comments: row.get("total_comments"),
            followers: row.get("followers"),
            following: row.get("following"),
        })
    }
}
