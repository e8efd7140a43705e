//! API models for trending topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::trending::TrendingTopicDBResponse;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrendingTopicResponse {
    pub tag: String,
    pub rank: i32,
    pub score: f64,
    /// Uses in the current window
    pub recent_count: i64,
    /// Uses in the window before it
    pub previous_count: i64,
    pub computed_at: DateTime<Utc>,
}

impl From<TrendingTopicDBResponse> for TrendingTopicResponse {
    fn from(db: TrendingTopicDBResponse) -> Self {
        Self {
            tag: db.tag,
            rank: db.rank,
            score: db.score,
            recent_count: db.recent_count,
            previous_count: db.previous_count,
            computed_at: db.computed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrendingRefreshResponse {
    pub topics: usize,
}
