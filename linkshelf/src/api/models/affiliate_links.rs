//! API request/response models for affiliate links and their click stats.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::models::affiliate_links::{AffiliateLinkDBResponse, DailyClicks};
use crate::errors::Error;
use crate::types::{AffiliateLinkId, BookmarkId, UserId};

static SHORT_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("short code pattern compiles"));

/// Default and maximum number of days in a stats series
pub const DEFAULT_STATS_DAYS: i32 = 30;
pub const MAX_STATS_DAYS: i32 = 365;

/// Check a caller-chosen short code. Codes are case sensitive.
pub fn validate_short_code(raw: &str) -> Result<String, Error> {
    let code = raw.trim();
    if !SHORT_CODE_RE.is_match(code) {
        return Err(Error::BadRequest {
            message: "Short code must be 3-32 characters of letters, digits, '_' or '-'".to_string(),
        });
    }
    Ok(code.to_string())
}

/// Random base62 code
pub fn generate_short_code(length: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AffiliateLinkCreate {
    pub target_url: String,
    /// Custom short code; generated when absent
    pub short_code: Option<String>,
    /// Bookmark this link promotes; must be owned by the caller
    #[schema(value_type = Option<String>, format = "uuid")]
    pub bookmark_id: Option<BookmarkId>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AffiliateLinkUpdate {
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    /// `null` clears the expiry
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AffiliateLinkResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AffiliateLinkId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub short_code: String,
    /// Public redirect URL for the short code
    pub short_url: String,
    pub target_url: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub bookmark_id: Option<BookmarkId>,
    pub description: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub click_count: i64,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AffiliateLinkResponse {
    pub fn new(db: AffiliateLinkDBResponse, short_url: String) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            short_code: db.short_code,
            short_url,
            target_url: db.target_url,
            bookmark_id: db.bookmark_id,
            description: db.description,
            is_active: db.is_active,
            expires_at: db.expires_at,
            click_count: db.click_count,
            last_clicked_at: db.last_clicked_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListAffiliateLinksQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[serde_with::serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct StatsQuery {
    /// Days in the series (default: 30, max: 365)
    #[param(default = 30, minimum = 1, maximum = 365)]
    #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
    pub days: Option<i32>,
}

impl StatsQuery {
    pub fn days(&self) -> i32 {
        self.days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, MAX_STATS_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyClicksResponse {
    pub day: NaiveDate,
    pub clicks: i64,
}

impl From<DailyClicks> for DailyClicksResponse {
    fn from(db: DailyClicks) -> Self {
        Self {
            day: db.day,
            clicks: db.clicks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AffiliateLinkStatsResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AffiliateLinkId,
    pub short_code: String,
    pub total_clicks: i64,
    pub clicks_in_window: i64,
    pub daily: Vec<DailyClicksResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_short_code() {
        assert_eq!(validate_short_code(" Spring-Sale_24 ").unwrap(), "Spring-Sale_24");
        assert!(validate_short_code("ab").is_err());
        assert!(validate_short_code("has space").is_err());
        assert!(validate_short_code("emoji🙂").is_err());
        assert!(validate_short_code(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_generate_short_code() {
        let code = generate_short_code(7);
        assert_eq!(code.len(), 7);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(validate_short_code(&code).is_ok());
    }

    #[test]
    fn test_stats_days() {
        assert_eq!(StatsQuery::default().days(), 30);
        assert_eq!(StatsQuery { days: Some(0) }.days(), 1);
        assert_eq!(StatsQuery { days: Some(9999) }.days(), 365);
    }

    #[test]
    fn test_update_distinguishes_null_expiry() {
        let cleared: AffiliateLinkUpdate = serde_json::from_str(r#"{"expires_at": null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));
        let untouched: AffiliateLinkUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.expires_at, None);
    }
}
