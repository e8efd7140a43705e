//! Aggregate queries backing the dashboards.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::analytics::{DailyCount, PlatformTotals, ProfileTotals},
};
use crate::types::{UserId, abbrev_uuid};

pub struct Analytics<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Analytics<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn profile_totals(&mut self, user_id: UserId) -> Result<ProfileTotals> {
        let totals = sqlx::query_as::<_, ProfileTotals>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM bookmarks WHERE owner_id = $1) AS bookmarks,
                (SELECT COUNT(*) FROM collections WHERE owner_id = $1) AS collections,
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1) AS followers,
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following,
                (SELECT COUNT(*) FROM affiliate_links WHERE owner_id = $1) AS affiliate_links,
                (SELECT COALESCE(SUM(click_count), 0)::BIGINT FROM affiliate_links WHERE owner_id = $1) AS total_clicks
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(totals)
    }

    /// Platform totals; clicks are counted over the last `days` days
    #[instrument(skip(self), err)]
    pub async fn platform_totals(&mut self, days: i32) -> Result<PlatformTotals> {
        let totals = sqlx::query_as::<_, PlatformTotals>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles) AS profiles,
                (SELECT COUNT(*) FROM bookmarks) AS bookmarks,
                (SELECT COUNT(*) FROM collections) AS collections,
                (SELECT COUNT(*) FROM reports WHERE status = 'pending') AS pending_reports,
                (SELECT COUNT(*) FROM affiliate_clicks WHERE clicked_at >= NOW() - make_interval(days => $1::int)) AS clicks_in_window
            "#,
        )
        .bind(days)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(totals)
    }

    /// New profiles per UTC day over the last `days` days, zero-filled
    #[instrument(skip(self), err)]
    pub async fn daily_signups(&mut self, days: i32) -> Result<Vec<DailyCount>> {
        let series = sqlx::query_as::<_, DailyCount>(
            r#"
            WITH days AS (
                SELECT generate_series(
                    (NOW() AT TIME ZONE 'UTC')::date - ($1::int - 1),
                    (NOW() AT TIME ZONE 'UTC')::date,
                    INTERVAL '1 day'
                )::date AS day
            )
            SELECT d.day, COUNT(p.id) AS count
            FROM days d
            LEFT JOIN profiles p ON (p.created_at AT TIME ZONE 'UTC')::date = d.day
            GROUP BY d.day
            ORDER BY d.day
            "#,
        )
        .bind(days)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_bookmark, create_test_collection, create_test_profile};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_profile_and_platform_totals(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let fan = create_test_profile(&pool).await;
        create_test_bookmark(&pool, owner.id, "https://one.example", &[], true).await;
        create_test_bookmark(&pool, owner.id, "https://two.example", &[], false).await;
        create_test_collection(&pool, owner.id, "stuff", true).await;

        let mut conn = pool.acquire().await.unwrap();
        crate::db::handlers::Profiles::new(&mut conn).follow(fan.id, owner.id).await.unwrap();

        let mut repo = Analytics::new(&mut conn);
        let totals = repo.profile_totals(owner.id).await.unwrap();
        assert_eq!(totals.bookmarks, 2);
        assert_eq!(totals.collections, 1);
        assert_eq!(totals.followers, 1);
        assert_eq!(totals.following, 0);
        assert_eq!(totals.total_clicks, 0);

        let platform = repo.platform_totals(7).await.unwrap();
        assert_eq!(platform.profiles, 2);
        assert_eq!(platform.bookmarks, 2);
        assert_eq!(platform.pending_reports, 0);

        let signups = repo.daily_signups(7).await.unwrap();
        assert_eq!(signups.len(), 7);
        assert_eq!(signups.last().unwrap().count, 2);
    }
}
