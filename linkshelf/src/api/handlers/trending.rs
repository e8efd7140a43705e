use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::trending::{TrendingRefreshResponse, TrendingTopicResponse},
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::Trending,
    errors::{Error, Result},
    trending::update_trending_topics,
};

/// The latest trending snapshot, best rank first
#[utoipa::path(
    get,
    path = "/trending",
    tag = "trending",
    responses((status = 200, description = "Trending topics", body = [TrendingTopicResponse]))
)]
#[tracing::instrument(skip_all)]
pub async fn list_trending(State(state): State<AppState>) -> Result<Json<Vec<TrendingTopicResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let topics = Trending::new(&mut conn).list(state.config.trending.max_topics as i64).await?;
    Ok(Json(topics.into_iter().map(Into::into).collect()))
}

/// Recompute the snapshot now instead of waiting for the next scheduled refresh
#[utoipa::path(
    post,
    path = "/trending/refresh",
    tag = "admin",
    responses((status = 200, description = "Snapshot replaced", body = TrendingRefreshResponse), (status = 403, description = "Not an admin")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_trending(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Trending, operation::UpdateAll>,
) -> Result<Json<TrendingRefreshResponse>> {
    let topics = update_trending_topics(&state.db, &state.config.trending).await?;
    tracing::info!(count = topics.len(), "Trending topics refreshed on demand");
    Ok(Json(TrendingRefreshResponse { topics: topics.len() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_admin, create_test_app, create_test_bookmark, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::{StatusCode, header};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_then_list(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin(&pool).await;
        let member = create_test_profile(&pool).await;
        let config = create_test_config();

        for i in 0..4 {
            let author = create_test_profile(&pool).await;
            create_test_bookmark(&pool, author.id, &format!("https://rust{i}.example/"), &["rust"], true).await;
        }
        create_test_bookmark(&pool, member.id, "https://lonely.example/", &["lonely"], true).await;

        server
            .post("/admin/api/v1/trending/refresh")
            .add_header(header::COOKIE, session_cookie_for(&member, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let refreshed: TrendingRefreshResponse = server
            .post("/admin/api/v1/trending/refresh")
            .add_header(header::COOKIE, session_cookie_for(&admin, &config))
            .await
            .json();
        assert_eq!(refreshed.topics, 1);

        // Listing needs no session
        let topics: Vec<TrendingTopicResponse> = server.get("/api/v1/trending").await.json();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].tag, "rust");
        assert_eq!(topics[0].rank, 1);
        assert_eq!(topics[0].recent_count, 4);
    }
}
