use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::{
    AppState,
    api::models::{
        notifications::{ListNotificationsQuery, MarkAllReadResponse, NotificationResponse, UnreadCountResponse},
        pagination::PaginatedResponse,
        profiles::CurrentUser,
    },
    db::{handlers::Notifications, models::notifications::NotificationDBResponse},
    errors::{Error, Result},
    types::{NotificationId, UserId},
};

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(ListNotificationsQuery),
    responses((status = 200, description = "Notifications, newest first", body = PaginatedResponse<NotificationResponse>)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<NotificationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let unread_only = query.unread_only.unwrap_or(false);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut conn);
    let notifications = repo.list(current_user.id, unread_only, skip, limit).await?;
    let total = repo.count(current_user.id, unread_only).await?;

    Ok(Json(PaginatedResponse::new(
        notifications.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    tag = "notifications",
    responses((status = 200, description = "Unread notifications", body = UnreadCountResponse)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn unread_count(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UnreadCountResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let unread = Notifications::new(&mut conn).count(current_user.id, true).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    params(("id" = String, Path, description = "Notification ID")),
    responses((status = 204, description = "Marked as read"), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_read(State(state): State<AppState>, Path(id): Path<NotificationId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Notifications::new(&mut conn).mark_read(id, current_user.id).await? {
        return Err(Error::NotFound {
            resource: "Notification".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    responses((status = 200, description = "Number of notifications marked", body = MarkAllReadResponse)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_all_read(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<MarkAllReadResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let marked = Notifications::new(&mut conn).mark_all_read(current_user.id).await?;
    Ok(Json(MarkAllReadResponse { marked }))
}

/// Events for one recipient out of the instance-wide broadcast. Lagged
/// subscribers skip what they missed; clients can re-read the list endpoint.
fn recipient_events(rx: broadcast::Receiver<NotificationDBResponse>, recipient: UserId) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(move |received| match received {
        Ok(notification) if notification.recipient_id == recipient => {
            let id = notification.id.to_string();
            let payload = NotificationResponse::from(notification);
            match Event::default().event("notification").id(id).json_data(payload) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize notification event");
                    None
                }
            }
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Notification stream lagged");
            None
        }
    })
}

/// Live notifications as Server-Sent Events
#[utoipa::path(
    get,
    path = "/notifications/stream",
    tag = "notifications",
    responses((status = 200, description = "text/event-stream of `notification` events", content_type = "text/event-stream")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn stream_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!("Opening notification stream");
    let stream = recipient_events(state.notifications.subscribe(), current_user.id);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.config.notifications.keep_alive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::notifications::{NotificationCreateDBRequest, NotificationKind};
    use crate::notifications::notify;
    use crate::test_utils::{create_test_app, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::header;
    use chrono::Utc;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn sample(recipient_id: UserId, message: &str) -> NotificationDBResponse {
        NotificationDBResponse {
            id: Uuid::new_v4(),
            recipient_id,
            kind: NotificationKind::System,
            actor_id: None,
            subject_id: None,
            message: message.to_string(),
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stream_filters_by_recipient() {
        let (tx, rx) = broadcast::channel(8);
        let me = Uuid::new_v4();
        let stream = recipient_events(rx, me);

        tx.send(sample(Uuid::new_v4(), "someone else")).unwrap();
        tx.send(sample(me, "first")).unwrap();
        tx.send(sample(me, "second")).unwrap();
        drop(tx);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
    }

    async fn seed(pool: &PgPool, recipient_id: UserId, count: usize) {
        for i in 0..count {
            notify(
                pool,
                NotificationCreateDBRequest {
                    recipient_id,
                    kind: NotificationKind::System,
                    actor_id: None,
                    subject_id: None,
                    message: format!("message {i}"),
                },
            )
            .await;
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_read_state(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let me = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        seed(&pool, me.id, 3).await;
        seed(&pool, other.id, 1).await;
        let cookie = session_cookie_for(&me, &create_test_config());

        let count: UnreadCountResponse = server
            .get("/api/v1/notifications/unread-count")
            .add_header(header::COOKIE, cookie.clone())
            .await
            .json();
        assert_eq!(count.unread, 3);

        let listed: PaginatedResponse<NotificationResponse> =
            server.get("/api/v1/notifications").add_header(header::COOKIE, cookie.clone()).await.json();
        assert_eq!(listed.total_count, 3);

        server
            .post(&format!("/api/v1/notifications/{}/read", listed.data[0].id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let unread: PaginatedResponse<NotificationResponse> = server
            .get("/api/v1/notifications")
            .add_query_param("unread_only", "true")
            .add_header(header::COOKIE, cookie.clone())
            .await
            .json();
        assert_eq!(unread.total_count, 2);
        assert!(unread.data.iter().all(|n| !n.read));

        // Someone else's notification cannot be marked
        let mut conn = pool.acquire().await.unwrap();
        let theirs = Notifications::new(&mut conn).list(other.id, false, 0, 1).await.unwrap();
        server
            .post(&format!("/api/v1/notifications/{}/read", theirs[0].id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let marked: MarkAllReadResponse = server
            .post("/api/v1/notifications/read-all")
            .add_header(header::COOKIE, cookie.clone())
            .await
            .json();
        assert_eq!(marked.marked, 2);

        let count: UnreadCountResponse = server
            .get("/api/v1/notifications/unread-count")
            .add_header(header::COOKIE, cookie)
            .await
            .json();
        assert_eq!(count.unread, 0);
    }
}
