//! Dashboard payloads for profile owners and admins.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::affiliate_links::{AffiliateLinkResponse, DailyClicksResponse};
use super::trending::TrendingTopicResponse;
use crate::analytics::ProjectedCount;
use crate::db::models::analytics::{DailyCount, PlatformTotals, ProfileTotals};

pub const DEFAULT_DASHBOARD_DAYS: i32 = 30;
pub const MAX_DASHBOARD_DAYS: i32 = 365;

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct DashboardQuery {
    /// Days in the daily series (default: 30, max: 365)
    #[param(default = 30, minimum = 1, maximum = 365)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub days: Option<i32>,
}

impl DashboardQuery {
    pub fn days(&self) -> i32 {
        self.days.unwrap_or(DEFAULT_DASHBOARD_DAYS).clamp(1, MAX_DASHBOARD_DAYS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileTotalsResponse {
    pub bookmarks: i64,
    pub collections: i64,
    pub followers: i64,
    pub following: i64,
    pub affiliate_links: i64,
    pub total_clicks: i64,
}

impl From<ProfileTotals> for ProfileTotalsResponse {
    fn from(db: ProfileTotals) -> Self {
        Self {
            bookmarks: db.bookmarks,
            collections: db.collections,
            followers: db.followers,
            following: db.following,
            affiliate_links: db.affiliate_links,
            total_clicks: db.total_clicks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectedClicksResponse {
    pub day: NaiveDate,
    pub clicks: f64,
}

impl From<ProjectedCount> for ProjectedClicksResponse {
    fn from(p: ProjectedCount) -> Self {
        Self { day: p.day, clicks: p.count }
    }
}

/// The caller's own activity
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub days: i32,
    pub totals: ProfileTotalsResponse,
    pub daily_clicks: Vec<DailyClicksResponse>,
    pub top_links: Vec<AffiliateLinkResponse>,
    /// Linear-trend projection of daily clicks for the next 7 days
    pub projected_clicks: Vec<ProjectedClicksResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlatformTotalsResponse {
    pub profiles: i64,
    pub bookmarks: i64,
    pub collections: i64,
    pub pending_reports: i64,
    pub clicks_in_window: i64,
}

impl From<PlatformTotals> for PlatformTotalsResponse {
    fn from(db: PlatformTotals) -> Self {
        Self {
            profiles: db.profiles,
            bookmarks: db.bookmarks,
            collections: db.collections,
            pending_reports: db.pending_reports,
            clicks_in_window: db.clicks_in_window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyCountResponse {
    pub day: NaiveDate,
    pub count: i64,
}

impl From<DailyCount> for DailyCountResponse {
    fn from(db: DailyCount) -> Self {
        Self { day: db.day, count: db.count }
    }
}

/// Platform-wide activity for admins
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminDashboardResponse {
    pub days: i32,
    pub totals: PlatformTotalsResponse,
    pub daily_signups: Vec<DailyCountResponse>,
    pub daily_clicks: Vec<DailyClicksResponse>,
    pub trending: Vec<TrendingTopicResponse>,
}
