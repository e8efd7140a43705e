//! Database models for API keys.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{ApiKeyId, UserId};

/// Database request for creating a new API key. Only the hash and a display
/// prefix of the secret are stored.
#[derive(Debug, Clone)]
pub struct ApiKeyCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyDBResponse {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: String,
    pub key_prefix: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
