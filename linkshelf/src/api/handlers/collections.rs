use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        bookmarks::BookmarkResponse,
        collections::{CollectionCreate, CollectionItemResponse, CollectionResponse, CollectionUpdate, validate_name},
        pagination::{PaginatedResponse, Pagination},
        profiles::CurrentUser,
    },
    auth::{current_user::MaybeCurrentUser, permissions::can_modify},
    db::{
        handlers::{Bookmarks, Collections, Repository, collections::CollectionFilter},
        models::collections::{CollectionCreateDBRequest, CollectionDBResponse, CollectionUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{BookmarkId, CollectionId, Operation, Resource},
    webhooks::{events::WebhookEvent, service::emit},
};

fn not_found(id: CollectionId) -> Error {
    Error::NotFound {
        resource: "Collection".to_string(),
        id: id.to_string(),
    }
}

async fn load_for_mutation(
    state: &AppState,
    current_user: &CurrentUser,
    id: CollectionId,
    operation: Operation,
) -> Result<CollectionDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let collection = Collections::new(&mut conn)
        .get_visible(id, current_user.viewer())
        .await?
        .ok_or_else(|| not_found(id))?;

    if !can_modify(current_user, Resource::Collections, operation, collection.owner_id) {
        return Err(Error::Forbidden {
            message: "Only the owner can change this collection".to_string(),
        });
    }
    Ok(collection)
}

/// List the caller's own collections
#[utoipa::path(
    get,
    path = "/collections",
    tag = "collections",
    params(Pagination),
    responses((status = 200, description = "Own collections", body = PaginatedResponse<CollectionResponse>)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_collections(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<CollectionResponse>>> {
    let (skip, limit) = pagination.params();
    let filter = CollectionFilter::new(current_user.viewer(), skip, limit).owned_by(current_user.id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Collections::new(&mut conn);
    let collections = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        collections.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

/// Create a collection. Names are unique per owner.
#[utoipa::path(
    post,
    path = "/collections",
    tag = "collections",
    request_body = CollectionCreate,
    responses(
        (status = 201, description = "Collection created", body = CollectionResponse),
        (status = 409, description = "Name already used"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_collection(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<CollectionCreate>,
) -> Result<(StatusCode, Json<CollectionResponse>)> {
    let request = CollectionCreateDBRequest {
        owner_id: current_user.id,
        name: validate_name(&create.name)?,
        description: create.description,
        is_public: create.is_public,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let collection = Collections::new(&mut conn).create(&request).await?;
    drop(conn);

    emit(
        &state.db,
        state.config.webhooks.enabled,
        current_user.id,
        WebhookEvent::collection_created(&collection),
    )
    .await;

    Ok((StatusCode::CREATED, Json(collection.into())))
}

#[utoipa::path(
    get,
    path = "/collections/{id}",
    tag = "collections",
    params(("id" = String, Path, description = "Collection ID")),
    responses((status = 200, description = "Collection", body = CollectionResponse), (status = 404, description = "Not found or not visible")),
)]
#[tracing::instrument(skip_all)]
pub async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<CollectionId>,
    caller: MaybeCurrentUser,
) -> Result<Json<CollectionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let collection = Collections::new(&mut conn)
        .get_visible(id, caller.viewer())
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(collection.into()))
}

#[utoipa::path(
    patch,
    path = "/collections/{id}",
    tag = "collections",
    request_body = CollectionUpdate,
    params(("id" = String, Path, description = "Collection ID")),
    responses(
        (status = 200, description = "Updated collection", body = CollectionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<CollectionId>,
    current_user: CurrentUser,
    Json(update): Json<CollectionUpdate>,
) -> Result<Json<CollectionResponse>> {
    load_for_mutation(&state, &current_user, id, Operation::UpdateAll).await?;

    let request = CollectionUpdateDBRequest {
        name: update.name.as_deref().map(validate_name).transpose()?,
        description: update.description,
        is_public: update.is_public,
    };
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let collection = Collections::new(&mut conn).update(id, &request).await?;
    Ok(Json(collection.into()))
}

#[utoipa::path(
    delete,
    path = "/collections/{id}",
    tag = "collections",
    params(("id" = String, Path, description = "Collection ID")),
    responses((status = 204, description = "Deleted"), (status = 403, description = "Not the owner"), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_collection(
    State(state): State<AppState>,
    Path(id): Path<CollectionId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    load_for_mutation(&state, &current_user, id, Operation::DeleteAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Collections::new(&mut conn).delete(id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Bookmarks in a collection that the caller may see, in position order
#[utoipa::path(
    get,
    path = "/collections/{id}/bookmarks",
    tag = "collections",
    params(("id" = String, Path, description = "Collection ID"), Pagination),
    responses((status = 200, description = "Collection items", body = PaginatedResponse<BookmarkResponse>), (status = 404, description = "Not found")),
)]
#[tracing::instrument(skip_all)]
pub async fn list_collection_items(
    State(state): State<AppState>,
    Path(id): Path<CollectionId>,
    Query(pagination): Query<Pagination>,
    caller: MaybeCurrentUser,
) -> Result<Json<PaginatedResponse<BookmarkResponse>>> {
    let viewer = caller.viewer();
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Collections::new(&mut conn);
    repo.get_visible(id, viewer).await?.ok_or_else(|| not_found(id))?;
    let items = repo.items(id, viewer, skip, limit).await?;
    let total = repo.count_items(id, viewer).await?;

    Ok(Json(PaginatedResponse::new(
        items.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

/// Append a bookmark to a collection
///
/// The bookmark must be visible to the collection owner. Adding the same
/// bookmark twice returns 409.
#[utoipa::path(
    post,
    path = "/collections/{id}/bookmarks/{bookmark_id}",
    tag = "collections",
    params(("id" = String, Path, description = "Collection ID"), ("bookmark_id" = String, Path, description = "Bookmark ID")),
    responses(
        (status = 201, description = "Added", body = CollectionItemResponse),
        (status = 404, description = "Collection or bookmark not found"),
        (status = 409, description = "Already in the collection"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_collection_item(
    State(state): State<AppState>,
    Path((id, bookmark_id)): Path<(CollectionId, BookmarkId)>,
    current_user: CurrentUser,
) -> Result<(StatusCode, Json<CollectionItemResponse>)> {
    let collection = load_for_mutation(&state, &current_user, id, Operation::UpdateAll).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    // Visibility is judged from the owner's point of view, not a moderator acting for them
    let owner_view = crate::db::handlers::Viewer::profile(collection.owner_id, false);
    Bookmarks::new(&mut tx)
        .get_visible(bookmark_id, owner_view)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Bookmark".to_string(),
            id: bookmark_id.to_string(),
        })?;
    let position = Collections::new(&mut tx).add_item(id, bookmark_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((
        StatusCode::CREATED,
        Json(CollectionItemResponse {
            collection_id: id,
            bookmark_id,
            position,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/collections/{id}/bookmarks/{bookmark_id}",
    tag = "collections",
    params(("id" = String, Path, description = "Collection ID"), ("bookmark_id" = String, Path, description = "Bookmark ID")),
    responses((status = 204, description = "Removed"), (status = 404, description = "Not in the collection")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_collection_item(
    State(state): State<AppState>,
    Path((id, bookmark_id)): Path<(CollectionId, BookmarkId)>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    load_for_mutation(&state, &current_user, id, Operation::UpdateAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Collections::new(&mut conn).remove_item(id, bookmark_id).await? {
        return Err(Error::NotFound {
            resource: "Collection item".to_string(),
            id: bookmark_id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_bookmark, create_test_collection, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::header;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_collection_crud(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_profile(&pool).await;
        let stranger = create_test_profile(&pool).await;
        let config = create_test_config();
        let cookie = session_cookie_for(&owner, &config);

        let response = server
            .post("/api/v1/collections")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"name": "Reading list", "is_public": false}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: CollectionResponse = response.json();
        assert_eq!(created.bookmark_count, 0);

        server
            .post("/api/v1/collections")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"name": "Reading list"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let path = format!("/api/v1/collections/{}", created.id);
        server
            .get(&path)
            .add_header(header::COOKIE, session_cookie_for(&stranger, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let updated: CollectionResponse = server
            .patch(&path)
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"is_public": true, "name": "Weekend reading"}))
            .await
            .json();
        assert!(updated.is_public);
        assert_eq!(updated.name, "Weekend reading");

        server
            .delete(&path)
            .add_header(header::COOKIE, session_cookie_for(&stranger, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let listed: PaginatedResponse<CollectionResponse> =
            server.get("/api/v1/collections").add_header(header::COOKIE, cookie.clone()).await.json();
        assert_eq!(listed.total_count, 1);

        server
            .delete(&path)
            .add_header(header::COOKIE, cookie)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[sqlx::test]
    async fn test_collection_items(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        let config = create_test_config();
        let cookie = session_cookie_for(&owner, &config);

        let collection = create_test_collection(&pool, owner.id, "Rust", true).await;
        let first = create_test_bookmark(&pool, owner.id, "https://doc.rust-lang.org/book/", &["rust"], true).await;
        let second = create_test_bookmark(&pool, owner.id, "https://rust-lang.github.io/async-book/", &["rust"], false).await;
        let foreign_private = create_test_bookmark(&pool, other.id, "https://secret.example/", &[], false).await;

        let base = format!("/api/v1/collections/{}/bookmarks", collection.id);
        let item: CollectionItemResponse = server
            .post(&format!("{base}/{}", first.id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .json();
        assert_eq!(item.position, 1);
        let item: CollectionItemResponse = server
            .post(&format!("{base}/{}", second.id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .json();
        assert_eq!(item.position, 2);

        server
            .post(&format!("{base}/{}", first.id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status(StatusCode::CONFLICT);
        server
            .post(&format!("{base}/{}", foreign_private.id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);

        // Anonymous callers only see the public item
        let public: PaginatedResponse<BookmarkResponse> = server.get(&base).await.json();
        assert_eq!(public.total_count, 1);
        assert_eq!(public.data[0].id, first.id);

        let own: PaginatedResponse<BookmarkResponse> = server.get(&base).add_header(header::COOKIE, cookie.clone()).await.json();
        assert_eq!(own.data.iter().map(|b| b.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        server
            .delete(&format!("{base}/{}", first.id))
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&format!("{base}/{}", first.id))
            .add_header(header::COOKIE, cookie)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
