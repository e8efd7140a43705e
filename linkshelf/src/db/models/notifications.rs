//! Database models for in-app notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{NotificationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewFollower,
    BookmarkSaved,
    ReportResolved,
    ContentRemoved,
    System,
}

#[derive(Debug, Clone)]
pub struct NotificationCreateDBRequest {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub actor_id: Option<UserId>,
    pub subject_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationDBResponse {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub actor_id: Option<UserId>,
    pub subject_id: Option<Uuid>,
    pub message: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
