//! Database models for profiles and the follow graph.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::UserId;

/// Database request for creating a new profile
#[derive(Debug, Clone)]
pub struct ProfileCreateDBRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub auth_source: String,
    pub is_admin: bool,
    pub is_moderator: bool,
}

/// Database request for updating the editable parts of a profile.
/// `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateDBRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
    pub password_hash: Option<String>,
}

/// Database request for completing onboarding
#[derive(Debug, Clone)]
pub struct OnboardingDBRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Moderation flags an admin can change
#[derive(Debug, Clone, Default)]
pub struct ProfileFlagsUpdateDBRequest {
    pub is_admin: Option<bool>,
    pub is_moderator: Option<bool>,
    pub is_suspended: Option<bool>,
}

/// Database response for a profile
#[derive(Debug, Clone, FromRow)]
pub struct ProfileDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
    pub password_hash: Option<String>,
    pub auth_source: String,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_suspended: bool,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileDBResponse {
    /// Moderators and admins see hidden and private content.
    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

/// Aggregate counts shown on a public profile
#[derive(Debug, Clone, FromRow)]
pub struct ProfileStats {
    pub bookmark_count: i64,
    pub collection_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_followed_by_me: bool,
}

/// Entry in a followers / following list
#[derive(Debug, Clone, FromRow)]
pub struct FollowDBResponse {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: DateTime<Utc>,
}
