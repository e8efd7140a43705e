//! Database models for collections.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{CollectionId, UserId};

#[derive(Debug, Clone)]
pub struct CollectionCreateDBRequest {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CollectionDBResponse {
    pub id: CollectionId,
    pub owner_id: UserId,
    pub owner_username: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub bookmark_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
