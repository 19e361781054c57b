use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub author_username: Option<String>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub claps: i64,
}

/// Clap tally for a post or comment.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClapSummary {
    pub claps: i64,
    pub clapped_by_viewer: bool,
}
