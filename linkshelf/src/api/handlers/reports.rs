//! Reporting content and the moderation queue.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        profiles::CurrentUser,
        reports::{ListReportsQuery, ReportCreate, ReportResolve, ReportResponse, ResolutionAction},
    },
    auth::permissions::{RequiresPermission, operation, require_permission, resource},
    db::{
        handlers::{Bookmarks, Collections, Profiles, Repository, Reports, Viewer, reports::ReportFilter},
        models::{
            notifications::{NotificationCreateDBRequest, NotificationKind},
            profiles::ProfileFlagsUpdateDBRequest,
            reports::{ReportCreateDBRequest, ReportDBResponse, ReportResolutionDBRequest, ReportStatus, ReportTargetType},
        },
    },
    errors::{Error, Result},
    notifications::notify,
    types::{Operation, ReportId, Resource, UserId},
    webhooks::{events::WebhookEvent, service::emit},
};

/// Owner of a report target, if the viewer can see it
async fn visible_target_owner(state: &AppState, target_type: ReportTargetType, target_id: Uuid, viewer: Viewer) -> Result<Option<UserId>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let owner = match target_type {
        ReportTargetType::Bookmark => Bookmarks::new(&mut conn).get_visible(target_id, viewer).await?.map(|b| b.owner_id),
        ReportTargetType::Collection => Collections::new(&mut conn).get_visible(target_id, viewer).await?.map(|c| c.owner_id),
        ReportTargetType::Profile => Profiles::new(&mut conn)
            .get_by_id(target_id)
            .await?
            .filter(|p| !p.is_suspended || viewer.privileged)
            .map(|p| p.id),
    };
    Ok(owner)
}

/// Report a bookmark, collection or profile
///
/// Only content visible to the caller can be reported, never your own, and
/// at most one pending report per target.
#[utoipa::path(
    post,
    path = "/reports",
    tag = "reports",
    request_body = ReportCreate,
    responses(
        (status = 201, description = "Report filed", body = ReportResponse),
        (status = 400, description = "Reporting your own content"),
        (status = 404, description = "Target not found"),
        (status = 409, description = "Already reported"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<ReportCreate>,
) -> Result<(StatusCode, Json<ReportResponse>)> {
    let target_owner_id = visible_target_owner(&state, create.target_type, create.target_id, current_user.viewer())
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Report target".to_string(),
            id: create.target_id.to_string(),
        })?;

    if target_owner_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot report your own content".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let report = Reports::new(&mut conn)
        .create(&ReportCreateDBRequest {
            reporter_id: current_user.id,
            target_type: create.target_type,
            target_id: create.target_id,
            target_owner_id,
            reason: create.reason,
            details: create.details,
        })
        .await
        .map_err(|e| match e {
            crate::db::errors::DbError::UniqueViolation { .. } => Error::Conflict {
                message: "You already have a pending report for this content".to_string(),
            },
            other => Error::Database(other),
        })?;

    tracing::info!(report_id = %report.id, target_type = ?report.target_type, "Report filed");
    Ok((StatusCode::CREATED, Json(report.into())))
}

/// Moderation queue
#[utoipa::path(
    get,
    path = "/reports",
    tag = "moderation",
    params(ListReportsQuery),
    responses((status = 200, description = "Reports", body = PaginatedResponse<ReportResponse>), (status = 403, description = "Not a moderator")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListReportsQuery>,
    _: RequiresPermission<resource::Reports, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<ReportResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ReportFilter {
        skip,
        limit,
        status: query.status,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Reports::new(&mut conn);
    let reports = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        reports.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

fn resolution_message(report: &ReportDBResponse) -> String {
    match report.status {
        ReportStatus::Dismissed => "Your report was reviewed and dismissed".to_string(),
        _ => "Your report was reviewed and action was taken".to_string(),
    }
}

/// Resolve a pending report
#[utoipa::path(
    post,
    path = "/reports/{id}/resolve",
    tag = "moderation",
    request_body = ReportResolve,
    params(("id" = String, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Resolved report", body = ReportResponse),
        (status = 400, description = "Action does not apply to the target"),
        (status = 403, description = "Suspending requires an admin"),
        (status = 404, description = "No such report"),
        (status = 409, description = "Report already resolved"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn resolve_report(
    State(state): State<AppState>,
    Path(id): Path<ReportId>,
    RequiresPermission(moderator, _): RequiresPermission<resource::Reports, operation::UpdateAll>,
    Json(resolve): Json<ReportResolve>,
) -> Result<Json<ReportResponse>> {
    if resolve.action == ResolutionAction::SuspendUser {
        require_permission(&moderator, Resource::Profiles, Operation::UpdateAll)?;
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let pending = Reports::new(&mut tx).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Report".to_string(),
        id: id.to_string(),
    })?;

    if resolve.action == ResolutionAction::RemoveContent && pending.target_type == ReportTargetType::Profile {
        return Err(Error::BadRequest {
            message: "Profiles cannot be removed; use suspend_user".to_string(),
        });
    }
    if resolve.action == ResolutionAction::SuspendUser && pending.target_owner_id == moderator.id {
        return Err(Error::BadRequest {
            message: "You cannot suspend yourself".to_string(),
        });
    }

    let report = Reports::new(&mut tx)
        .resolve(
            id,
            &ReportResolutionDBRequest {
                status: resolve.action.resulting_status(),
                resolved_by: moderator.id,
                resolution_note: resolve.note,
            },
        )
        .await?
        .ok_or_else(|| Error::Conflict {
            message: "Report has already been resolved".to_string(),
        })?;

    match (resolve.action, report.target_type) {
        (ResolutionAction::RemoveContent, ReportTargetType::Bookmark) => {
            Bookmarks::new(&mut tx).hide(report.target_id).await?;
        }
        (ResolutionAction::RemoveContent, ReportTargetType::Collection) => {
            Collections::new(&mut tx).make_private(report.target_id).await?;
        }
        (ResolutionAction::SuspendUser, _) => {
            Profiles::new(&mut tx)
                .update_flags(
                    report.target_owner_id,
                    &ProfileFlagsUpdateDBRequest {
                        is_suspended: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
        _ => {}
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(report_id = %report.id, action = ?resolve.action, moderator_id = %moderator.id, "Report resolved");

    notify(
        &state.db,
        NotificationCreateDBRequest {
            recipient_id: report.reporter_id,
            kind: NotificationKind::ReportResolved,
            actor_id: None,
            subject_id: Some(report.id),
            message: resolution_message(&report),
        },
    )
    .await;

    if resolve.action != ResolutionAction::Dismiss {
        let message = match resolve.action {
            ResolutionAction::SuspendUser => "Your account was suspended after a moderation review".to_string(),
            _ => "Some of your content was removed from public view after a moderation review".to_string(),
        };
        notify(
            &state.db,
            NotificationCreateDBRequest {
                recipient_id: report.target_owner_id,
                kind: NotificationKind::ContentRemoved,
                actor_id: None,
                subject_id: Some(report.target_id),
                message,
            },
        )
        .await;
    }

    emit(
        &state.db,
        state.config.webhooks.enabled,
        report.reporter_id,
        WebhookEvent::report_resolved(&report),
    )
    .await;

    Ok(Json(report.into()))
}
