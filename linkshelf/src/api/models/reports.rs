//! API request/response models for moderation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::pagination::Pagination;
use crate::db::models::reports::{ReportDBResponse, ReportReason, ReportStatus, ReportTargetType};
use crate::types::{ReportId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportCreate {
    pub target_type: ReportTargetType,
    #[schema(value_type = String, format = "uuid")]
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
}

/// What a moderator does with a pending report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Close without changes
    Dismiss,
    /// Hide the bookmark, or make the collection private
    RemoveContent,
    /// Suspend the owner of the reported content (admins only)
    SuspendUser,
}

impl ResolutionAction {
    pub fn resulting_status(self) -> ReportStatus {
        match self {
            ResolutionAction::Dismiss => ReportStatus::Dismissed,
            ResolutionAction::RemoveContent | ResolutionAction::SuspendUser => ReportStatus::Actioned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResolve {
    pub action: ResolutionAction,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReportId,
    #[schema(value_type = String, format = "uuid")]
    pub reporter_id: UserId,
    pub target_type: ReportTargetType,
    #[schema(value_type = String, format = "uuid")]
    pub target_id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub target_owner_id: UserId,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub status: ReportStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resolved_by: Option<UserId>,
    pub resolution_note: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReportDBResponse> for ReportResponse {
    fn from(db: ReportDBResponse) -> Self {
        Self {
            id: db.id,
            reporter_id: db.reporter_id,
            target_type: db.target_type,
            target_id: db.target_id,
            target_owner_id: db.target_owner_id,
            reason: db.reason,
            details: db.details,
            status: db.status,
            resolved_by: db.resolved_by,
            resolution_note: db.resolution_note,
            resolved_at: db.resolved_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListReportsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only reports in this state
    pub status: Option<ReportStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_action_parsing() {
        let resolve: ReportResolve = serde_json::from_str(r#"{"action": "remove_content"}"#).unwrap();
        assert_eq!(resolve.action, ResolutionAction::RemoveContent);
        assert_eq!(resolve.action.resulting_status(), ReportStatus::Actioned);
        assert_eq!(ResolutionAction::Dismiss.resulting_status(), ReportStatus::Dismissed);
        assert!(serde_json::from_str::<ReportResolve>(r#"{"action": "ban"}"#).is_err());
    }
}
