//! API request/response models for profiles and the follow graph.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::handlers::Viewer;
use crate::db::models::profiles::{FollowDBResponse, ProfileDBResponse, ProfileStats};
use crate::errors::Error;
use crate::types::UserId;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]{3,32}$").expect("username pattern compiles"));

/// Lowercase and check a requested username.
pub fn normalize_username(raw: &str) -> Result<String, Error> {
    let username = raw.trim().to_lowercase();
    if !USERNAME_RE.is_match(&username) {
        return Err(Error::BadRequest {
            message: "Username must be 3-32 characters of lowercase letters, digits or underscores".to_string(),
        });
    }
    Ok(username)
}

/// Roles are derived from profile flags, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl Role {
    pub fn from_flags(is_admin: bool, is_moderator: bool) -> Vec<Role> {
        let mut roles = vec![Role::Member];
        if is_moderator {
            roles.push(Role::Moderator);
        }
        if is_admin {
            roles.push(Role::Admin);
        }
        roles
    }
}

/// The authenticated caller, re-read from `profiles` on every request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub roles: Vec<Role>,
    pub onboarded: bool,
}

impl CurrentUser {
    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_moderator
    }

    pub fn viewer(&self) -> Viewer {
        Viewer::profile(self.id, self.is_privileged())
    }
}

impl From<ProfileDBResponse> for CurrentUser {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            roles: Role::from_flags(db.is_admin, db.is_moderator),
            id: db.id,
            username: db.username,
            email: db.email,
            display_name: db.display_name,
            avatar_url: db.avatar_url,
            is_admin: db.is_admin,
            is_moderator: db.is_moderator,
            onboarded: db.onboarded_at.is_some(),
        }
    }
}

/// Full profile, returned to its owner and to admins
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
    pub auth_source: String,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_suspended: bool,
    pub roles: Vec<Role>,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileDBResponse> for ProfileResponse {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            roles: Role::from_flags(db.is_admin, db.is_moderator),
            id: db.id,
            username: db.username,
            email: db.email,
            display_name: db.display_name,
            bio: db.bio,
            avatar_url: db.avatar_url,
            website_url: db.website_url,
            auth_source: db.auth_source,
            is_admin: db.is_admin,
            is_moderator: db.is_moderator,
            is_suspended: db.is_suspended,
            onboarded_at: db.onboarded_at,
            last_login: db.last_login,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Profile page as seen by another caller. Email is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub bookmark_count: i64,
    pub collection_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_followed_by_me: bool,
}

impl PublicProfileResponse {
    pub fn new(db: ProfileDBResponse, stats: ProfileStats) -> Self {
        Self {
            id: db.id,
            username: db.username,
            display_name: db.display_name,
            bio: db.bio,
            avatar_url: db.avatar_url,
            website_url: db.website_url,
            created_at: db.created_at,
            bookmark_count: stats.bookmark_count,
            collection_count: stats.collection_count,
            follower_count: stats.follower_count,
            following_count: stats.following_count,
            is_followed_by_me: stats.is_followed_by_me,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OnboardingRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FollowResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
}

impl From<FollowDBResponse> for FollowResponse {
    fn from(db: FollowDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            display_name: db.display_name,
            avatar_url: db.avatar_url,
            followed_at: db.followed_at,
        }
    }
}

/// Result of a follow or unfollow call
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FollowStatus {
    pub following: bool,
    pub follower_count: i64,
}

/// Moderation flags an admin may change
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdminProfileUpdate {
    pub is_admin: Option<bool>,
    pub is_moderator: Option<bool>,
    pub is_suspended: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListProfilesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring over username, display name and email
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  Alice_99 ").unwrap(), "alice_99");
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username("has space").is_err());
        assert!(normalize_username("dash-not-allowed").is_err());
        assert!(normalize_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_roles_from_flags() {
        assert_eq!(Role::from_flags(false, false), vec![Role::Member]);
        assert_eq!(Role::from_flags(true, true), vec![Role::Member, Role::Moderator, Role::Admin]);
    }
}
