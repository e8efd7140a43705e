//! Database models for bookmarks.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{BookmarkId, UserId};

/// Database request for creating a bookmark. Tags are expected to be normalised already.
#[derive(Debug, Clone)]
pub struct BookmarkCreateDBRequest {
    pub owner_id: UserId,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
}

/// Database request for updating a bookmark
#[derive(Debug, Clone, Default)]
pub struct BookmarkUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

/// Database response for a bookmark, joined with the owner's username
#[derive(Debug, Clone, FromRow)]
pub struct BookmarkDBResponse {
    pub id: BookmarkId,
    pub owner_id: UserId,
    pub owner_username: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A public bookmark considered for a caller's feed, with the ranking signals
/// that are cheaper to compute in SQL.
#[derive(Debug, Clone, FromRow)]
pub struct FeedCandidate {
    pub id: BookmarkId,
    pub owner_id: UserId,
    pub owner_username: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// The caller follows the owner
    pub followed: bool,
    /// Distinct profiles that saved the same URL
    pub popularity: i64,
}
