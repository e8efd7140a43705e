//! Database models for moderation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{ReportId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "report_target_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportTargetType {
    Bookmark,
    Collection,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "report_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Abuse,
    Illegal,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Dismissed,
    Actioned,
}

#[derive(Debug, Clone)]
pub struct ReportCreateDBRequest {
    pub reporter_id: UserId,
    pub target_type: ReportTargetType,
    pub target_id: Uuid,
    pub target_owner_id: UserId,
    pub reason: ReportReason,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportResolutionDBRequest {
    pub status: ReportStatus,
    pub resolved_by: UserId,
    pub resolution_note: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReportDBResponse {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub target_type: ReportTargetType,
    pub target_id: Uuid,
    pub target_owner_id: UserId,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub resolved_by: Option<UserId>,
    pub resolution_note: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
