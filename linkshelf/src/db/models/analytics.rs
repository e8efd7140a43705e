//! Database models for dashboard aggregates.

use chrono::NaiveDate;
use sqlx::FromRow;

/// Lifetime totals for one profile
#[derive(Debug, Clone, Default, FromRow)]
pub struct ProfileTotals {
    pub bookmarks: i64,
    pub collections: i64,
    pub followers: i64,
    pub following: i64,
    pub affiliate_links: i64,
    pub total_clicks: i64,
}

/// Platform-wide totals for the admin dashboard
#[derive(Debug, Clone, Default, FromRow)]
pub struct PlatformTotals {
    pub profiles: i64,
    pub bookmarks: i64,
    pub collections: i64,
    pub pending_reports: i64,
    pub clicks_in_window: i64,
}

/// A count for one UTC day
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}
