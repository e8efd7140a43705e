//! Owner and admin dashboards.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    analytics::project,
    api::{
        handlers::affiliate_links::respond,
        models::dashboard::{AdminDashboardResponse, DashboardQuery, DashboardResponse},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{AffiliateLinks, Analytics, Trending},
        models::{affiliate_links::DailyClicks, analytics::DailyCount},
    },
    errors::{Error, Result},
};

const TOP_LINKS: i64 = 5;
const DASHBOARD_TRENDING: i64 = 10;

fn as_counts(series: &[DailyClicks]) -> Vec<DailyCount> {
    series
        .iter()
        .map(|d| DailyCount {
            day: d.day,
            count: d.clicks,
        })
        .collect()
}

/// The caller's own activity, with a 7-day click projection
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    params(DashboardQuery),
    responses((status = 200, description = "Dashboard", body = DashboardResponse)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    RequiresPermission(user, _): RequiresPermission<resource::Analytics, operation::ReadOwn>,
) -> Result<Json<DashboardResponse>> {
    let days = query.days();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let totals = Analytics::new(&mut conn).profile_totals(user.id).await?;
    let mut links = AffiliateLinks::new(&mut conn);
    let daily = links.daily_clicks(Some(user.id), days).await?;
    let top_links = links.top_links(user.id, TOP_LINKS).await?;

    let projected_clicks = project(&as_counts(&daily)).into_iter().map(Into::into).collect();

    Ok(Json(DashboardResponse {
        days,
        totals: totals.into(),
        daily_clicks: daily.into_iter().map(Into::into).collect(),
        top_links: top_links.into_iter().map(|l| respond(&state.config, l)).collect(),
        projected_clicks,
    }))
}

/// Platform activity. Results are cached per `days` for a minute.
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "admin",
    params(DashboardQuery),
    responses((status = 200, description = "Admin dashboard", body = AdminDashboardResponse), (status = 403, description = "Not an admin")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_admin_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    _: RequiresPermission<resource::Analytics, operation::ReadAll>,
) -> Result<Json<AdminDashboardResponse>> {
    let days = query.days();
    if let Some(cached) = state.dashboard_cache.get(&days).await {
        tracing::debug!(days, "Admin dashboard served from cache");
        return Ok(Json(cached));
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut analytics = Analytics::new(&mut conn);
    let totals = analytics.platform_totals(days).await?;
    let daily_signups = analytics.daily_signups(days).await?;
    let daily_clicks = AffiliateLinks::new(&mut conn).daily_clicks(None, days).await?;
    let trending = Trending::new(&mut conn).list(DASHBOARD_TRENDING).await?;

    let response = AdminDashboardResponse {
        days,
        totals: totals.into(),
        daily_signups: daily_signups.into_iter().map(Into::into).collect(),
        daily_clicks: daily_clicks.into_iter().map(Into::into).collect(),
        trending: trending.into_iter().map(Into::into).collect(),
    };
    state.dashboard_cache.insert(days, response.clone()).await;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_admin, create_test_app, create_test_bookmark, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::{StatusCode, header};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_own_dashboard(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_profile(&pool).await;
        let cookie = session_cookie_for(&owner, &create_test_config());
        create_test_bookmark(&pool, owner.id, "https://one.example/", &[], true).await;

        server
            .post("/api/v1/affiliate-links")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"target_url": "https://shop.example.com/", "short_code": "dash"}))
            .await
            .assert_status(StatusCode::CREATED);
        server.get("/r/dash").await.assert_status(StatusCode::FOUND);
        server.get("/r/dash").await.assert_status(StatusCode::FOUND);

        let dashboard: DashboardResponse = server
            .get("/api/v1/dashboard")
            .add_query_param("days", "14")
            .add_header(header::COOKIE, cookie)
            .await
            .json();
        assert_eq!(dashboard.days, 14);
        assert_eq!(dashboard.totals.bookmarks, 1);
        assert_eq!(dashboard.totals.affiliate_links, 1);
        assert_eq!(dashboard.totals.total_clicks, 2);
        assert_eq!(dashboard.daily_clicks.len(), 14);
        assert_eq!(dashboard.daily_clicks.last().map(|d| d.clicks), Some(2));
        assert_eq!(dashboard.top_links[0].short_code, "dash");
        assert_eq!(dashboard.projected_clicks.len(), 7);
        assert!(dashboard.projected_clicks.iter().all(|p| p.clicks >= 0.0));
    }

    #[sqlx::test]
    async fn test_admin_dashboard_is_admin_only_and_cached(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let member = create_test_profile(&pool).await;
        let config = create_test_config();

        server
            .get("/admin/api/v1/dashboard")
            .add_header(header::COOKIE, session_cookie_for(&member, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let first: AdminDashboardResponse = server
            .get("/admin/api/v1/dashboard")
            .add_header(header::COOKIE, session_cookie_for(&admin, &config))
            .await
            .json();
        assert_eq!(first.days, 30);
        assert_eq!(first.daily_signups.len(), 30);

        // A new profile does not show up until the cached entry expires
        create_test_profile(&pool).await;
        let second: AdminDashboardResponse = server
            .get("/admin/api/v1/dashboard")
            .add_header(header::COOKIE, session_cookie_for(&admin, &config))
            .await
            .json();
        assert_eq!(second.totals.profiles, first.totals.profiles);
    }
}
