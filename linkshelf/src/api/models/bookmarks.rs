//! API request/response models for bookmarks.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::models::bookmarks::BookmarkDBResponse;
use crate::errors::Error;
use crate::types::{BookmarkId, UserId};

pub const MAX_TAGS: usize = 10;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]{1,32}$").expect("tag pattern compiles"));

/// Lowercase, trim and de-duplicate tags, keeping first-seen order. Empty
/// entries are dropped.
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>, Error> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        if !TAG_RE.is_match(&tag) {
            return Err(Error::BadRequest {
                message: format!("Invalid tag '{tag}': use 1-32 lowercase letters, digits or dashes"),
            });
        }
        tags.push(tag);
    }

    if tags.len() > MAX_TAGS {
        return Err(Error::BadRequest {
            message: format!("A bookmark can have at most {MAX_TAGS} tags"),
        });
    }
    Ok(tags)
}

/// Parse an http(s) URL, returning its canonical form.
pub fn validate_url(raw: &str) -> Result<String, Error> {
    let url = Url::parse(raw.trim()).map_err(|_| Error::BadRequest {
        message: format!("Invalid URL: {raw}"),
    })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(Error::BadRequest {
            message: "URL must use http or https".to_string(),
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookmarkCreate {
    pub url: String,
    /// Defaults to the URL
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BookmarkUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookmarkResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookmarkId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub owner_username: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    /// Hidden by a moderator
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookmarkDBResponse> for BookmarkResponse {
    fn from(db: BookmarkDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            owner_username: db.owner_username,
            url: db.url,
            title: db.title,
            description: db.description,
            tags: db.tags,
            is_public: db.is_public,
            is_hidden: db.is_hidden,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListBookmarksQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only bookmarks carrying this tag
    pub tag: Option<String>,

    /// Case-insensitive substring over title and URL
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(
            normalize_tags(&strings(&[" Rust ", "rust", "web-dev", "", "RUST"])).unwrap(),
            vec!["rust", "web-dev"]
        );
        assert!(normalize_tags(&strings(&["no spaces"])).is_err());
        assert!(normalize_tags(&strings(&["under_score"])).is_err());
        assert!(normalize_tags(&[("x".repeat(33))]).is_err());

        let many: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
        assert!(normalize_tags(&many).is_err());
        assert_eq!(normalize_tags(&many[..10]).unwrap().len(), 10);
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url(" https://example.com/a?b=1 ").unwrap(), "https://example.com/a?b=1");
        assert_eq!(validate_url("http://example.com").unwrap(), "http://example.com/");
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
