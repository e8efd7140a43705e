use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        bookmarks::{BookmarkCreate, BookmarkResponse, BookmarkUpdate, ListBookmarksQuery, normalize_tags, validate_url},
        pagination::PaginatedResponse,
        profiles::CurrentUser,
    },
    auth::{current_user::MaybeCurrentUser, permissions::can_modify},
    db::{
        handlers::{Bookmarks, Repository, bookmarks::BookmarkFilter},
        models::{
            bookmarks::{BookmarkCreateDBRequest, BookmarkDBResponse, BookmarkUpdateDBRequest},
            notifications::{NotificationCreateDBRequest, NotificationKind},
        },
    },
    errors::{Error, Result},
    notifications::notify,
    types::{BookmarkId, Operation, Resource},
    webhooks::{events::WebhookEvent, service::emit},
};

fn not_found(id: BookmarkId) -> Error {
    Error::NotFound {
        resource: "Bookmark".to_string(),
        id: id.to_string(),
    }
}

/// Load a bookmark visible to the caller and check they may apply `operation` to it.
pub(crate) async fn load_for_mutation(
    state: &AppState,
    current_user: &CurrentUser,
    id: BookmarkId,
    operation: Operation,
) -> Result<BookmarkDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let bookmark = Bookmarks::new(&mut conn)
        .get_visible(id, current_user.viewer())
        .await?
        .ok_or_else(|| not_found(id))?;

    if !can_modify(current_user, Resource::Bookmarks, operation, bookmark.owner_id) {
        return Err(Error::Forbidden {
            message: "Only the owner can change this bookmark".to_string(),
        });
    }
    Ok(bookmark)
}

/// List the caller's own bookmarks
#[utoipa::path(
    get,
    path = "/bookmarks",
    tag = "bookmarks",
    params(ListBookmarksQuery),
    responses((status = 200, description = "Own bookmarks", body = PaginatedResponse<BookmarkResponse>)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_bookmarks(
    State(state): State<AppState>,
    Query(query): Query<ListBookmarksQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<BookmarkResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = BookmarkFilter::new(current_user.viewer(), skip, limit)
        .owned_by(current_user.id)
        .with_tag(query.tag.map(|t| t.trim().to_lowercase()))
        .with_search(query.search);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Bookmarks::new(&mut conn);
    let bookmarks = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        bookmarks.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

/// Save a bookmark
///
/// Saving a URL twice returns 409. When the new bookmark is public, owners of
/// other public bookmarks of the same URL are notified.
#[utoipa::path(
    post,
    path = "/bookmarks",
    tag = "bookmarks",
    request_body = BookmarkCreate,
    responses(
        (status = 201, description = "Bookmark saved", body = BookmarkResponse),
        (status = 400, description = "Invalid URL or tags"),
        (status = 409, description = "URL already saved"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_bookmark(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<BookmarkCreate>,
) -> Result<(StatusCode, Json<BookmarkResponse>)> {
    let url = validate_url(&create.url)?;
    let tags = normalize_tags(&create.tags)?;
    let title = create
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.clone());

    let request = BookmarkCreateDBRequest {
        owner_id: current_user.id,
        url,
        title,
        description: create.description,
        tags,
        is_public: create.is_public,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Bookmarks::new(&mut conn);
    let bookmark = repo.create(&request).await?;
    let others = if bookmark.is_public {
        repo.public_owners_of_url(&bookmark.url, current_user.id).await?
    } else {
        Vec::new()
    };
    drop(conn);

    for recipient_id in others {
        notify(
            &state.db,
            NotificationCreateDBRequest {
                recipient_id,
                kind: NotificationKind::BookmarkSaved,
                actor_id: Some(current_user.id),
                subject_id: Some(bookmark.id),
                message: format!("@{} also saved {}", current_user.username, bookmark.title),
            },
        )
        .await;
    }

    emit(
        &state.db,
        state.config.webhooks.enabled,
        current_user.id,
        WebhookEvent::bookmark_created(&bookmark),
    )
    .await;

    Ok((StatusCode::CREATED, Json(bookmark.into())))
}

/// Get a bookmark the caller may see
#[utoipa::path(
    get,
    path = "/bookmarks/{id}",
    tag = "bookmarks",
    params(("id" = String, Path, description = "Bookmark ID")),
    responses((status = 200, description = "Bookmark", body = BookmarkResponse), (status = 404, description = "Not found or not visible")),
)]
#[tracing::instrument(skip_all)]
pub async fn get_bookmark(
    State(state): State<AppState>,
    Path(id): Path<BookmarkId>,
    caller: MaybeCurrentUser,
) -> Result<Json<BookmarkResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let bookmark = Bookmarks::new(&mut conn)
        .get_visible(id, caller.viewer())
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(bookmark.into()))
}

#[utoipa::path(
    patch,
    path = "/bookmarks/{id}",
    tag = "bookmarks",
    request_body = BookmarkUpdate,
    params(("id" = String, Path, description = "Bookmark ID")),
    responses(
        (status = 200, description = "Updated bookmark", body = BookmarkResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_bookmark(
    State(state): State<AppState>,
    Path(id): Path<BookmarkId>,
    current_user: CurrentUser,
    Json(update): Json<BookmarkUpdate>,
) -> Result<Json<BookmarkResponse>> {
    load_for_mutation(&state, &current_user, id, Operation::UpdateAll).await?;

    let tags = update.tags.as_deref().map(normalize_tags).transpose()?;
    let title = match update.title {
        Some(t) if t.trim().is_empty() => {
            return Err(Error::BadRequest {
                message: "Title cannot be empty".to_string(),
            });
        }
        other => other,
    };

    let request = BookmarkUpdateDBRequest {
        title,
        description: update.description,
        tags,
        is_public: update.is_public,
    };
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let bookmark = Bookmarks::new(&mut conn).update(id, &request).await?;
    Ok(Json(bookmark.into()))
}

#[utoipa::path(
    delete,
    path = "/bookmarks/{id}",
    tag = "bookmarks",
    params(("id" = String, Path, description = "Bookmark ID")),
    responses((status = 204, description = "Deleted"), (status = 403, description = "Not the owner"), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_bookmark(
    State(state): State<AppState>,
    Path(id): Path<BookmarkId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let bookmark = load_for_mutation(&state, &current_user, id, Operation::DeleteAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Bookmarks::new(&mut conn).delete(id).await? {
        return Err(not_found(id));
    }
    drop(conn);

    emit(
        &state.db,
        state.config.webhooks.enabled,
        bookmark.owner_id,
        WebhookEvent::bookmark_deleted(&bookmark),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
