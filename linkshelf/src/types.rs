//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, BookmarkId, etc.)
//! - Permission and authorization types
//! - Resource and operation enums for access control
//!
//! # Permission System
//!
//! The permission system is based on three core types:
//!
//! - [`Resource`]: What entity type is being accessed (Bookmarks, Reports, etc.)
//! - [`Operation`]: What action is being performed (Read, Create, Update, Delete)
//! - [`Permission`]: Authorization requirement combining resource and operation
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access to all entities (e.g., `ReadAll`, `DeleteAll`)
//! - **Own**: Restricted to the caller's own entities (e.g., `ReadOwn`, `UpdateOwn`)

use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type ApiKeyId = Uuid;
pub type BookmarkId = Uuid;
pub type CollectionId = Uuid;
pub type AffiliateLinkId = Uuid;
pub type ReportId = Uuid;
pub type NotificationId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Operations that can be performed on resources
// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
    // System
    SystemAccess,
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Profiles,
    Bookmarks,
    Collections,
    AffiliateLinks,
    Reports,
    Notifications,
    ApiKeys,
    Webhooks,
    Analytics,
    Trending,
    System,
}

// Permission types for authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Caller must own the specific resource instance
    Granted,
    /// Logical combinators
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
            Operation::SystemAccess => write!(f, "Access"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Profiles => "profiles",
            Resource::Bookmarks => "bookmarks",
            Resource::Collections => "collections",
            Resource::AffiliateLinks => "affiliate links",
            Resource::Reports => "reports",
            Resource::Notifications => "notifications",
            Resource::ApiKeys => "API keys",
            Resource::Webhooks => "webhooks",
            Resource::Analytics => "analytics",
            Resource::Trending => "trending topics",
            Resource::System => "system",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_operation_display_collapses_scope() {
        assert_eq!(Operation::ReadAll.to_string(), "Read");
        assert_eq!(Operation::ReadOwn.to_string(), "Read");
        assert_eq!(Operation::DeleteOwn.to_string(), "Delete");
        assert_eq!(Resource::AffiliateLinks.to_string(), "affiliate links");
    }
}
