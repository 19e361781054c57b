use serde::Serialize;

/// Aggregate activity for one author.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct UserStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_views: i64,
    pub total_claps: i64,
    pub total_comments: i64,
    pub followers: i64,
    pub following: i64,
}
