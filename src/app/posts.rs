use anyhow::{anyhow, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::pagination::PageRequest;
use crate::domain::post::{Category, Post, PostStatus};
use crate::infra::db::Db;

const POST_COLUMNS: &str = "p.id, p.owner_id, u.username AS owner_username, u.name AS owner_name, \
     p.title, p.slug, p.description, p.content, p.image_url, p.category_slug, p.status, \
     p.views, p.created_at, p.updated_at";

const MAX_SLUG_BASE_LEN: usize = 80;
const SLUG_SUFFIX_LEN: usize = 6;

fn post_from_row(row: &PgRow) -> Result<Post> {
    let status: String = row.get("status");
    let status =
        PostStatus::from_db(&status).ok_or_else(|| anyhow!("unknown post status: {}", status))?;

    Ok(Post {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        owner_username: row.get("owner_username"),
        owner_name: row.get("owner_name"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        content: row.get("content"),
        image_url: row.get("image_url"),
        category: row.get("category_slug"),
        status,
        views: row.get("views"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn posts_from_rows(rows: Vec<PgRow>) -> Result<Vec<Post>> {
    rows.iter().map(post_from_row).collect()
}

/// Lowercase, hyphen-separated form of a title, limited to ASCII alphanumerics.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_BASE_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("post");
    }
    slug
}

fn unique_slug(title: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SLUG_SUFFIX_LEN)
        .map(|byte| (byte as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", slugify(title), suffix)
}

pub struct NewPost {
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub category: String,
    pub status: PostStatus,
}

#[derive(Default)]
/// `None` leaves a field untouched. For the nullable fields `Some(None)` clears it.
pub struct PostUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub content: Option<String>,
    pub image_url: Option<Option<String>>,
    pub category: Option<String>,
    pub status: Option<PostStatus>,
}

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn category_exists(&self, slug: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE slug = $1)")
                .bind(slug)
                .fetch_one(self.db.pool())
                .await?;
        Ok(exists)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT c.slug, c.title, \
                    COUNT(p.id) FILTER (WHERE p.status = 'published') AS post_count \
             FROM categories c \
             LEFT JOIN posts p ON p.category_slug = c.slug \
             GROUP BY c.slug, c.title \
             ORDER BY c.title",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Category {
                slug: row.get("slug"),
                title: row.get("title"),
                post_count: row.get("post_count"),
            })
            .collect())
    }

    pub async fn create_post(&self, owner_id: Uuid, post: NewPost) -> Result<Post> {
        let row = sqlx::query(&format!(
            "WITH p AS ( \
                INSERT INTO posts (owner_id, title, slug, description, content, image_url, category_slug, status) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                RETURNING * \
             ) \
             SELECT {POST_COLUMNS} FROM p JOIN users u ON u.id = p.owner_id"
        ))
        .bind(owner_id)
        .bind(&post.title)
        .bind(unique_slug(&post.title))
        .bind(post.description)
        .bind(post.content)
        .bind(post.image_url)
        .bind(post.category)
        .bind(post.status.as_db())
        .fetch_one(self.db.pool())
        .await?;

        let post = post_from_row(&row)?;
        tracing::info!(post_id = %post.id, owner_id = %owner_id, status = post.status.as_db(), "post created");
        Ok(post)
    }

    /// Published post, or a draft when the viewer owns it. Does not count a view.
    pub async fn get_post(&self, post_id: Uuid, viewer_id: Option<Uuid>) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
             WHERE p.id = $1 AND (p.status = 'published' OR p.owner_id = $2)"
        ))
        .bind(post_id)
        .bind(viewer_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// Increments the view counter of a published post and returns it.
    pub async fn record_view(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "WITH p AS ( \
                UPDATE posts SET views = views + 1 \
                WHERE id = $1 AND status = 'published' \
                RETURNING * \
             ) \
             SELECT {POST_COLUMNS} FROM p JOIN users u ON u.id = p.owner_id"
        ))
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    pub async fn update_post(
        &self,
        post_id: Uuid,
        owner_id: Uuid,
        update: PostUpdate,
    ) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "WITH p AS ( \
                UPDATE posts \
                SET title = COALESCE($3, title), \
                    description = CASE WHEN $9 THEN $4 ELSE description END, \
                    content = COALESCE($5, content), \
                    image_url = CASE WHEN $10 THEN $6 ELSE image_url END, \
                    category_slug = COALESCE($7, category_slug), \
                    status = COALESCE($8, status), \
                    updated_at = now() \
                WHERE id = $1 AND owner_id = $2 \
                RETURNING * \
             ) \
             SELECT {POST_COLUMNS} FROM p JOIN users u ON u.id = p.owner_id"
        ))
        .bind(post_id)
        .bind(owner_id)
        .bind(update.title)
        .bind(update.description.clone().flatten())
        .bind(update.content)
        .bind(update.image_url.clone().flatten())
        .bind(update.category)
        .bind(update.status.map(|status| status.as_db()))
        .bind(update.description.is_some())
        .bind(update.image_url.is_some())
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    pub async fn delete_post(&self, post_id: Uuid, owner_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND owner_id = $2")
            .bind(post_id)
            .bind(owner_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// One page of published posts, newest first, plus the total match count.
    pub async fn list_published(
        &self,
        page: PageRequest,
        category: Option<&str>,
    ) -> Result<(Vec<Post>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts \
             WHERE status = 'published' AND ($1::text IS NULL OR category_slug = $1)",
        )
        .bind(category)
        .fetch_one(self.db.pool())
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
             WHERE p.status = 'published' AND ($1::text IS NULL OR p.category_slug = $1) \
             ORDER BY p.created_at DESC, p.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(category)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((posts_from_rows(rows)?, total))
    }

    pub async fn latest(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
             WHERE p.status = 'published' \
             ORDER BY p.created_at DESC, p.id DESC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        posts_from_rows(rows)
    }

    /// Page of an author's own posts, drafts included.
    pub async fn list_owned(&self, owner_id: Uuid, page: PageRequest) -> Result<(Vec<Post>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(self.db.pool())
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
             WHERE p.owner_id = $1 \
             ORDER BY p.created_at DESC, p.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(self.db.pool())
        .await?;

        Ok((posts_from_rows(rows)?, total))
    }

    /// Keyset page of a user's posts. Drafts are included only for the owner.
    pub async fn list_by_user(
        &self,
        owner_id: Uuid,
        viewer_id: Option<Uuid>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let include_drafts = viewer_id == Some(owner_id);
        let rows = match cursor {
            Some((created_at, post_id)) => {
                sqlx::query(&format!(
                    "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
                     WHERE p.owner_id = $1 \
                       AND ($2 OR p.status = 'published') \
                       AND (p.created_at < $3 OR (p.created_at = $3 AND p.id < $4)) \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $5"
                ))
                .bind(owner_id)
                .bind(include_drafts)
                .bind(created_at)
                .bind(post_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {POST_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
                     WHERE p.owner_id = $1 \
                       AND ($2 OR p.status = 'published') \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $3"
                ))
                .bind(owner_id)
                .bind(include_drafts)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        posts_from_rows(rows)
    }
}
