//! Database repository for affiliate links and their click log.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::affiliate_links::{
        AffiliateLinkCreateDBRequest, AffiliateLinkDBResponse, AffiliateLinkUpdateDBRequest, ClickMetadata, DailyClicks, RedirectMiss,
        RedirectTarget,
    },
};
use crate::types::{AffiliateLinkId, UserId, abbrev_uuid};

#[derive(Debug, Clone)]
pub struct AffiliateLinkFilter {
    pub skip: i64,
    pub limit: i64,
    pub owner_id: Option<UserId>,
}

impl AffiliateLinkFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, owner_id: None }
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        if let Some(owner_id) = self.owner_id {
            query.push(" AND owner_id = ");
            query.push_bind(owner_id);
        }
    }
}

pub struct AffiliateLinks<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for AffiliateLinks<'c> {
    type CreateRequest = AffiliateLinkCreateDBRequest;
    type UpdateRequest = AffiliateLinkUpdateDBRequest;
    type Response = AffiliateLinkDBResponse;
    type Id = AffiliateLinkId;
    type Filter = AffiliateLinkFilter;

    #[instrument(skip(self, request), fields(owner_id = %abbrev_uuid(&request.owner_id), short_code = %request.short_code), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let link = sqlx::query_as::<_, AffiliateLinkDBResponse>(
            r#"
            INSERT INTO affiliate_links (owner_id, short_code, target_url, bookmark_id, description, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.owner_id)
        .bind(&request.short_code)
        .bind(&request.target_url)
        .bind(request.bookmark_id)
        .bind(&request.description)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(link)
    }

    #[instrument(skip(self), fields(link_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let link = sqlx::query_as::<_, AffiliateLinkDBResponse>("SELECT * FROM affiliate_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(link)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM affiliate_links WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let links = query.build_query_as::<AffiliateLinkDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(links)
    }

    #[instrument(skip(self), fields(link_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM affiliate_links WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(link_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let link = sqlx::query_as::<_, AffiliateLinkDBResponse>(
            r#"
            UPDATE affiliate_links SET
                target_url = COALESCE($2, target_url),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                expires_at = CASE WHEN $5::boolean THEN $6 ELSE expires_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.target_url)
        .bind(&request.description)
        .bind(request.is_active)
        .bind(request.expires_at.is_some())
        .bind(request.expires_at.flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(link)
    }
}

impl<'c> AffiliateLinks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &AffiliateLinkFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM affiliate_links WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    #[instrument(skip(self), err)]
    pub async fn short_code_exists(&mut self, short_code: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM affiliate_links WHERE short_code = $1)")
            .bind(short_code)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists)
    }

    /// Count a click and return the target, in a single statement. Returns
    /// `None` when the code is unknown, inactive or expired.
    #[instrument(skip(self), err)]
    pub async fn record_redirect(&mut self, short_code: &str) -> Result<Option<RedirectTarget>> {
        let target = sqlx::query_as::<_, RedirectTarget>(
            r#"
            UPDATE affiliate_links
            SET click_count = click_count + 1, last_clicked_at = NOW()
            WHERE short_code = $1
              AND is_active
              AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING id, owner_id, short_code, target_url, click_count
            "#,
        )
        .bind(short_code)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(target)
    }

    /// Explain why `record_redirect` found nothing
    #[instrument(skip(self), err)]
    pub async fn classify_miss(&mut self, short_code: &str) -> Result<RedirectMiss> {
        let row: Option<(bool, bool)> = sqlx::query_as(
            r#"
            SELECT is_active, (expires_at IS NOT NULL AND expires_at <= NOW()) AS expired
            FROM affiliate_links WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(match row {
            None => RedirectMiss::Unknown,
            Some((false, _)) => RedirectMiss::Inactive,
            Some((true, true)) => RedirectMiss::Expired,
            // Became valid again between the two statements; treat as unknown
            Some((true, false)) => RedirectMiss::Unknown,
        })
    }

    #[instrument(skip(self, metadata), fields(link_id = %abbrev_uuid(&link_id)), err)]
    pub async fn record_click(&mut self, link_id: AffiliateLinkId, metadata: &ClickMetadata) -> Result<()> {
        sqlx::query("INSERT INTO affiliate_clicks (link_id, referrer, user_agent) VALUES ($1, $2, $3)")
            .bind(link_id)
            .bind(&metadata.referrer)
            .bind(&metadata.user_agent)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Clicks per UTC day for one link over the last `days` days, zero-filled.
    #[instrument(skip(self), fields(link_id = %abbrev_uuid(&link_id)), err)]
    pub async fn daily_clicks_for_link(&mut self, link_id: AffiliateLinkId, days: i32) -> Result<Vec<DailyClicks>> {
        let series = sqlx::query_as::<_, DailyClicks>(
            r#"
            WITH days AS (
                SELECT generate_series(
                    (NOW() AT TIME ZONE 'UTC')::date - ($2::int - 1),
                    (NOW() AT TIME ZONE 'UTC')::date,
                    INTERVAL '1 day'
                )::date AS day
            )
            SELECT d.day, COUNT(c.id) AS clicks
            FROM days d
            LEFT JOIN affiliate_clicks c
                ON c.link_id = $1 AND (c.clicked_at AT TIME ZONE 'UTC')::date = d.day
            GROUP BY d.day
            ORDER BY d.day
            "#,
        )
        .bind(link_id)
        .bind(days)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(series)
    }

    /// Clicks per UTC day across all links of an owner, zero-filled.
    /// With `owner_id = None` covers every link.
    #[instrument(skip(self), err)]
    pub async fn daily_clicks(&mut self, owner_id: Option<UserId>, days: i32) -> Result<Vec<DailyClicks>> {
        let series = sqlx::query_as::<_, DailyClicks>(
            r#"
            WITH days AS (
                SELECT generate_series(
                    (NOW() AT TIME ZONE 'UTC')::date - ($2::int - 1),
                    (NOW() AT TIME ZONE 'UTC')::date,
                    INTERVAL '1 day'
                )::date AS day
            ),
            clicks AS (
                SELECT (c.clicked_at AT TIME ZONE 'UTC')::date AS day
                FROM affiliate_clicks c
                JOIN affiliate_links l ON l.id = c.link_id
                WHERE ($1::uuid IS NULL OR l.owner_id = $1)
                  AND c.clicked_at >= NOW() - make_interval(days => $2::int)
            )
            SELECT d.day, COUNT(c.day) AS clicks
            FROM days d
            LEFT JOIN clicks c ON c.day = d.day
            GROUP BY d.day
            ORDER BY d.day
            "#,
        )
        .bind(owner_id)
        .bind(days)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(series)
    }

    /// An owner's links ordered by lifetime clicks
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn top_links(&mut self, owner_id: UserId, limit: i64) -> Result<Vec<AffiliateLinkDBResponse>> {
        let links = sqlx::query_as::<_, AffiliateLinkDBResponse>(
            "SELECT * FROM affiliate_links WHERE owner_id = $1 ORDER BY click_count DESC, created_at DESC LIMIT $2",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(links)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn total_clicks(&mut self, owner_id: UserId) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(click_count), 0)::BIGINT FROM affiliate_links WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_profile;
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    fn link_request(owner_id: UserId, code: &str) -> AffiliateLinkCreateDBRequest {
        AffiliateLinkCreateDBRequest {
            owner_id,
            short_code: code.to_string(),
            target_url: "https://shop.example.com/item?ref=me".to_string(),
            bookmark_id: None,
            description: None,
            expires_at: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_redirect_counts_and_classifies(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = AffiliateLinks::new(&mut conn);

        let live = repo.create(&link_request(owner.id, "live")).await.unwrap();
        let mut expired = link_request(owner.id, "expired");
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        repo.create(&expired).await.unwrap();
        let inactive = repo.create(&link_request(owner.id, "off")).await.unwrap();
        repo.update(
            inactive.id,
            &AffiliateLinkUpdateDBRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let first = repo.record_redirect("live").await.unwrap().unwrap();
        assert_eq!(first.id, live.id);
        assert_eq!(first.click_count, 1);
        assert_eq!(repo.record_redirect("live").await.unwrap().unwrap().click_count, 2);

        assert!(repo.record_redirect("expired").await.unwrap().is_none());
        assert_eq!(repo.classify_miss("expired").await.unwrap(), RedirectMiss::Expired);
        assert!(repo.record_redirect("off").await.unwrap().is_none());
        assert_eq!(repo.classify_miss("off").await.unwrap(), RedirectMiss::Inactive);
        assert_eq!(repo.classify_miss("nope").await.unwrap(), RedirectMiss::Unknown);

        assert_eq!(repo.total_clicks(owner.id).await.unwrap(), 2);
        assert_eq!(repo.top_links(owner.id, 1).await.unwrap()[0].id, live.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_daily_clicks_zero_filled(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = AffiliateLinks::new(&mut conn);
        let link = repo.create(&link_request(owner.id, "daily")).await.unwrap();

        for _ in 0..3 {
            repo.record_click(link.id, &ClickMetadata::default()).await.unwrap();
        }

        let series = repo.daily_clicks_for_link(link.id, 7).await.unwrap();
        assert_eq!(series.len(), 7);
        assert_eq!(series.last().unwrap().clicks, 3);
        assert_eq!(series.iter().map(|d| d.clicks).sum::<i64>(), 3);

        let owner_series = repo.daily_clicks(Some(owner.id), 7).await.unwrap();
        assert_eq!(owner_series, series);
        assert_eq!(repo.daily_clicks(Some(uuid::Uuid::new_v4()), 7).await.unwrap().iter().map(|d| d.clicks).sum::<i64>(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_clear_expiry_and_duplicate_code(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = AffiliateLinks::new(&mut conn);

        let mut request = link_request(owner.id, "sale");
        request.expires_at = Some(Utc::now() + Duration::days(1));
        let link = repo.create(&request).await.unwrap();
        assert!(repo.short_code_exists("sale").await.unwrap());

        let cleared = repo
            .update(
                link.id,
                &AffiliateLinkUpdateDBRequest {
                    expires_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.expires_at.is_none());

        let err = repo.create(&link_request(owner.id, "sale")).await.unwrap_err();
        assert!(err.is_unique_violation_on("affiliate_links_short_code_key"));
    }
}
