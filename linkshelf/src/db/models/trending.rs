//! Database models for trending topics.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Tag usage in the recent and the preceding window
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TagWindowCounts {
    pub tag: String,
    pub recent_count: i64,
    pub previous_count: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TrendingTopicDBResponse {
    pub tag: String,
    pub recent_count: i64,
    pub previous_count: i64,
    pub score: f64,
    pub rank: i32,
    pub computed_at: DateTime<Utc>,
}
