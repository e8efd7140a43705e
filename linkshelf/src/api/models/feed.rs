//! API models for the personalized feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::feed::RankedBookmark;
use crate::types::{BookmarkId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedItemResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookmarkId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub owner_username: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    /// Author is followed by the caller
    pub followed: bool,
    /// Tags shared with the caller's interests
    pub tag_overlap: usize,
    /// Distinct profiles that saved the URL
    pub popularity: i64,
}

impl From<RankedBookmark> for FeedItemResponse {
    fn from(ranked: RankedBookmark) -> Self {
        let c = ranked.candidate;
        Self {
            id: c.id,
            owner_id: c.owner_id,
            owner_username: c.owner_username,
            url: c.url,
            title: c.title,
            description: c.description,
            tags: c.tags,
            created_at: c.created_at,
            score: ranked.score,
            followed: c.followed,
            tag_overlap: ranked.tag_overlap,
            popularity: c.popularity,
        }
    }
}
