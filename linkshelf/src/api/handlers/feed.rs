use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::{
        feed::FeedItemResponse,
        pagination::{PaginatedResponse, Pagination},
        profiles::CurrentUser,
    },
    errors::{Error, Result},
    feed::generate_feed,
};

/// The caller's ranked feed of recent public bookmarks from other profiles
#[utoipa::path(
    get,
    path = "/feed",
    tag = "feed",
    params(Pagination),
    responses((status = 200, description = "Ranked feed page", body = PaginatedResponse<FeedItemResponse>)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_feed(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<FeedItemResponse>>> {
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let page = generate_feed(&mut conn, current_user.id, &state.config.feed, skip, limit).await?;

    Ok(Json(PaginatedResponse::new(
        page.items.into_iter().map(Into::into).collect(),
        page.total_count as i64,
        skip,
        limit,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_bookmark, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::{StatusCode, header};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_followed_authors_rank_first(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let me = create_test_profile(&pool).await;
        let friend = create_test_profile(&pool).await;
        let stranger = create_test_profile(&pool).await;
        let cookie = session_cookie_for(&me, &create_test_config());

        create_test_bookmark(&pool, stranger.id, "https://stranger.example/", &[], true).await;
        create_test_bookmark(&pool, friend.id, "https://friend.example/", &[], true).await;
        create_test_bookmark(&pool, friend.id, "https://private.example/", &[], false).await;

        server
            .post(&format!("/api/v1/profiles/{}/follow", friend.username))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status_success();

        let feed: PaginatedResponse<FeedItemResponse> = server.get("/api/v1/feed").add_header(header::COOKIE, cookie.clone()).await.json();
        assert_eq!(feed.total_count, 2);
        assert_eq!(feed.data[0].url, "https://friend.example/");
        assert!(feed.data[0].followed);
        assert!(!feed.data[1].followed);

        let second: PaginatedResponse<FeedItemResponse> = server
            .get("/api/v1/feed")
            .add_query_param("skip", "1")
            .add_query_param("limit", "1")
            .add_header(header::COOKIE, cookie)
            .await
            .json();
        assert_eq!(second.data.len(), 1);
        assert_eq!(second.data[0].url, "https://stranger.example/");
    }

    #[sqlx::test]
    async fn test_feed_requires_authentication(pool: PgPool) {
        let (server, _bg) = create_test_app(pool).await;
        server.get("/api/v1/feed").await.assert_status(StatusCode::UNAUTHORIZED);
    }
}
