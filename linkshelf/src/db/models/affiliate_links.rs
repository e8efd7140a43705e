//! Database models for affiliate links and their click log.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use crate::types::{AffiliateLinkId, BookmarkId, UserId};

#[derive(Debug, Clone)]
pub struct AffiliateLinkCreateDBRequest {
    pub owner_id: UserId,
    pub short_code: String,
    pub target_url: String,
    pub bookmark_id: Option<BookmarkId>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `expires_at: Some(None)` clears the expiry.
#[derive(Debug, Clone, Default)]
pub struct AffiliateLinkUpdateDBRequest {
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AffiliateLinkDBResponse {
    pub id: AffiliateLinkId,
    pub owner_id: UserId,
    pub short_code: String,
    pub target_url: String,
    pub bookmark_id: Option<BookmarkId>,
    pub description: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub click_count: i64,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row returned by the counting UPDATE of a successful redirect
#[derive(Debug, Clone, FromRow)]
pub struct RedirectTarget {
    pub id: AffiliateLinkId,
    pub owner_id: UserId,
    pub short_code: String,
    pub target_url: String,
    pub click_count: i64,
}

/// Why a short code did not redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMiss {
    Unknown,
    Inactive,
    Expired,
}

/// Request metadata stored with a click
#[derive(Debug, Clone, Default)]
pub struct ClickMetadata {
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

/// Clicks per calendar day (UTC)
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DailyClicks {
    pub day: NaiveDate,
    pub clicks: i64,
}
