//! Database repository for moderation reports.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::reports::{ReportCreateDBRequest, ReportDBResponse, ReportResolutionDBRequest, ReportStatus},
};
use crate::types::{ReportId, abbrev_uuid};

#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<ReportStatus>,
}

impl ReportFilter {
    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        if let Some(status) = self.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
    }
}

pub struct Reports<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reports<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(reporter = %abbrev_uuid(&request.reporter_id), target = %abbrev_uuid(&request.target_id)), err)]
    pub async fn create(&mut self, request: &ReportCreateDBRequest) -> Result<ReportDBResponse> {
        let report = sqlx::query_as::<_, ReportDBResponse>(
            r#"
            INSERT INTO reports (reporter_id, target_type, target_id, target_owner_id, reason, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.reporter_id)
        .bind(request.target_type)
        .bind(request.target_id)
        .bind(request.target_owner_id)
        .bind(request.reason)
        .bind(&request.details)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(report)
    }

    #[instrument(skip(self), fields(report_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: ReportId) -> Result<Option<ReportDBResponse>> {
        let report = sqlx::query_as::<_, ReportDBResponse>("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(report)
    }

    /// Oldest first, so the moderation queue is worked in arrival order
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &ReportFilter) -> Result<Vec<ReportDBResponse>> {
        let mut query = QueryBuilder::new("SELECT * FROM reports WHERE 1=1");
        filter.push_conditions(&mut query);
        query.push(" ORDER BY created_at ASC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let reports = query.build_query_as::<ReportDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(reports)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ReportFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM reports WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Resolve a pending report. Returns `None` if the report is not pending
    /// (already resolved, or does not exist).
    #[instrument(skip(self, request), fields(report_id = %abbrev_uuid(&id), status = ?request.status), err)]
    pub async fn resolve(&mut self, id: ReportId, request: &ReportResolutionDBRequest) -> Result<Option<ReportDBResponse>> {
        let report = sqlx::query_as::<_, ReportDBResponse>(
            r#"
            UPDATE reports SET
                status = $2,
                resolved_by = $3,
                resolution_note = $4,
                resolved_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(request.resolved_by)
        .bind(&request.resolution_note)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::reports::{ReportReason, ReportTargetType};
    use crate::test_utils::{create_test_bookmark, create_test_profile};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_one_pending_report_per_target(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let reporter = create_test_profile(&pool).await;
        let moderator = create_test_profile(&pool).await;
        let bookmark = create_test_bookmark(&pool, owner.id, "https://spam.example", &[], true).await;

        let request = ReportCreateDBRequest {
            reporter_id: reporter.id,
            target_type: ReportTargetType::Bookmark,
            target_id: bookmark.id,
            target_owner_id: owner.id,
            reason: ReportReason::Spam,
            details: Some("obvious spam".to_string()),
        };

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Reports::new(&mut conn);
        let report = repo.create(&request).await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);

        let err = repo.create(&request).await.unwrap_err();
        assert!(err.is_unique_violation_on("reports_one_pending_per_target"));

        let pending = ReportFilter {
            skip: 0,
            limit: 10,
            status: Some(ReportStatus::Pending),
        };
        assert_eq!(repo.count(&pending).await.unwrap(), 1);

        let resolution = ReportResolutionDBRequest {
            status: ReportStatus::Dismissed,
            resolved_by: moderator.id,
            resolution_note: None,
        };
        let resolved = repo.resolve(report.id, &resolution).await.unwrap().unwrap();
        assert_eq!(resolved.status, ReportStatus::Dismissed);
        assert!(resolved.resolved_at.is_some());
        assert!(repo.resolve(report.id, &resolution).await.unwrap().is_none());
        assert!(repo.list(&pending).await.unwrap().is_empty());

        // Once resolved, the same reporter may report again
        repo.create(&request).await.unwrap();
    }
}
