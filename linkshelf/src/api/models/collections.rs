//! API request/response models for collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::collections::CollectionDBResponse;
use crate::errors::Error;
use crate::types::{CollectionId, UserId};

const MAX_NAME_LEN: usize = 100;

/// Trim a collection name and check its length.
pub fn validate_name(raw: &str) -> Result<String, Error> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(Error::BadRequest {
            message: format!("Collection name must be 1-{MAX_NAME_LEN} characters"),
        });
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionCreate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CollectionId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub owner_username: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub bookmark_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CollectionDBResponse> for CollectionResponse {
    fn from(db: CollectionDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            owner_username: db.owner_username,
            name: db.name,
            description: db.description,
            is_public: db.is_public,
            bookmark_count: db.bookmark_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Result of adding a bookmark to a collection
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionItemResponse {
    #[schema(value_type = String, format = "uuid")]
    pub collection_id: CollectionId,
    #[schema(value_type = String, format = "uuid")]
    pub bookmark_id: crate::types::BookmarkId,
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Reading list ").unwrap(), "Reading list");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"n".repeat(101)).is_err());
    }
}
