use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Profile as other users see it. Never carries the email address.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
}

impl PublicUser {
    pub fn with_counts(user: User, followers: i64, following: i64, posts: i64) -> Self {
        Self {
            followers_count: followers,
            following_count: following,
            posts_count: posts,
            ..Self::from(user)
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            bio: user.bio,
            image_url: user.image_url,
            created_at: user.created_at,
            followers_count: 0,
            following_count: 0,
            posts_count: 0,
        }
    }
}
