//! API models for in-app notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::pagination::Pagination;
use crate::db::models::notifications::{NotificationDBResponse, NotificationKind};
use crate::types::{NotificationId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: NotificationId,
    pub kind: NotificationKind,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub actor_id: Option<UserId>,
    /// Bookmark, report or profile the notification is about
    #[schema(value_type = Option<String>, format = "uuid")]
    pub subject_id: Option<Uuid>,
    pub message: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            actor_id: db.actor_id,
            subject_id: db.subject_id,
            message: db.message,
            read: db.read_at.is_some(),
            read_at: db.read_at,
            created_at: db.created_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListNotificationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only unread notifications (default: false)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub unread_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub marked: u64,
}
