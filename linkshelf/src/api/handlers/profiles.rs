//! Profiles, the follow graph, and admin profile moderation.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::models::{
        bookmarks::BookmarkResponse,
        collections::CollectionResponse,
        pagination::{PaginatedResponse, Pagination},
        profiles::{
            AdminProfileUpdate, CurrentUser, FollowResponse, FollowStatus, ListProfilesQuery, ProfileResponse, ProfileUpdate,
            PublicProfileResponse,
        },
    },
    auth::{
        current_user::MaybeCurrentUser,
        permissions::{RequiresPermission, operation, resource},
    },
    db::{
        handlers::{
            Bookmarks, Collections, Profiles, Repository, Viewer, bookmarks::BookmarkFilter, collections::CollectionFilter,
            profiles::ProfileFilter,
        },
        models::{
            notifications::{NotificationCreateDBRequest, NotificationKind},
            profiles::{ProfileDBResponse, ProfileFlagsUpdateDBRequest, ProfileUpdateDBRequest},
        },
    },
    errors::Error,
    notifications::notify,
    types::UserId,
};

/// Resolve a username to a profile the viewer may see. Suspended profiles are
/// only visible to moderators and admins.
async fn find_visible_profile(state: &AppState, username: &str, viewer: Viewer) -> Result<ProfileDBResponse, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_by_username(&username.to_lowercase()).await?;

    match profile {
        Some(p) if !p.is_suspended || viewer.privileged => Ok(p),
        _ => Err(Error::NotFound {
            resource: "Profile".to_string(),
            id: username.to_string(),
        }),
    }
}

fn optional_url(raw: Option<String>) -> Result<Option<String>, Error> {
    raw.map(|u| {
        if u.trim().is_empty() {
            Ok(String::new())
        } else {
            crate::api::models::bookmarks::validate_url(&u)
        }
    })
    .transpose()
}

/// Get the caller's own profile
#[utoipa::path(
    get,
    path = "/profiles/me",
    tag = "profiles",
    responses((status = 200, description = "Own profile", body = ProfileResponse), (status = 401, description = "Unauthenticated")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_me(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<ProfileResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: current_user.id.to_string(),
    })?;
    Ok(Json(profile.into()))
}

/// Update the caller's own profile
#[utoipa::path(
    patch,
    path = "/profiles/me",
    request_body = ProfileUpdate,
    tag = "profiles",
    responses((status = 200, description = "Updated profile", body = ProfileResponse), (status = 400, description = "Invalid URL")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>, Error> {
    let request = ProfileUpdateDBRequest {
        display_name: update.display_name,
        bio: update.bio,
        avatar_url: optional_url(update.avatar_url)?,
        website_url: optional_url(update.website_url)?,
        password_hash: None,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).update(current_user.id, &request).await?;
    Ok(Json(profile.into()))
}

/// Public profile page
#[utoipa::path(
    get,
    path = "/profiles/{username}",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile username")),
    responses((status = 200, description = "Profile", body = PublicProfileResponse), (status = 404, description = "No such profile")),
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    caller: MaybeCurrentUser,
) -> Result<Json<PublicProfileResponse>, Error> {
    let viewer = caller.viewer();
    let profile = find_visible_profile(&state, &username, viewer).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stats = Profiles::new(&mut conn).stats(profile.id, viewer).await?;
    Ok(Json(PublicProfileResponse::new(profile, stats)))
}

/// Follow a profile. Following twice is a no-op.
#[utoipa::path(
    post,
    path = "/profiles/{username}/follow",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile to follow")),
    responses(
        (status = 200, description = "Following", body = FollowStatus),
        (status = 400, description = "Cannot follow yourself"),
        (status = 404, description = "No such profile"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn follow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<FollowStatus>, Error> {
    let target = find_visible_profile(&state, &username, current_user.viewer()).await?;
    if target.id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot follow yourself".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);
    let created = repo.follow(current_user.id, target.id).await?;
    let follower_count = repo.count_followers(target.id).await?;
    drop(conn);

    if created {
        notify(
            &state.db,
            NotificationCreateDBRequest {
                recipient_id: target.id,
                kind: NotificationKind::NewFollower,
                actor_id: Some(current_user.id),
                subject_id: Some(current_user.id),
                message: format!("@{} started following you", current_user.username),
            },
        )
        .await;
    }

    Ok(Json(FollowStatus {
        following: true,
        follower_count,
    }))
}

/// Unfollow a profile. Unfollowing someone you don't follow is a no-op.
#[utoipa::path(
    delete,
    path = "/profiles/{username}/follow",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile to unfollow")),
    responses((status = 200, description = "Not following", body = FollowStatus), (status = 404, description = "No such profile")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn unfollow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<FollowStatus>, Error> {
    let target = find_visible_profile(&state, &username, current_user.viewer()).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);
    repo.unfollow(current_user.id, target.id).await?;
    let follower_count = repo.count_followers(target.id).await?;

    Ok(Json(FollowStatus {
        following: false,
        follower_count,
    }))
}

/// Profiles following `username`
#[utoipa::path(
    get,
    path = "/profiles/{username}/followers",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile username"), Pagination),
    responses((status = 200, description = "Followers", body = PaginatedResponse<FollowResponse>)),
)]
#[tracing::instrument(skip_all)]
pub async fn list_followers(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
    caller: MaybeCurrentUser,
) -> Result<Json<PaginatedResponse<FollowResponse>>, Error> {
    let profile = find_visible_profile(&state, &username, caller.viewer()).await?;
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);
    let followers = repo.followers(profile.id, skip, limit).await?;
    let total = repo.count_followers(profile.id).await?;

    Ok(Json(PaginatedResponse::new(
        followers.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

/// Profiles `username` follows
#[utoipa::path(
    get,
    path = "/profiles/{username}/following",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile username"), Pagination),
    responses((status = 200, description = "Followed profiles", body = PaginatedResponse<FollowResponse>)),
)]
#[tracing::instrument(skip_all)]
pub async fn list_following(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
    caller: MaybeCurrentUser,
) -> Result<Json<PaginatedResponse<FollowResponse>>, Error> {
    let profile = find_visible_profile(&state, &username, caller.viewer()).await?;
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);
    let following = repo.following(profile.id, skip, limit).await?;
    let total = repo.count_following(profile.id).await?;

    Ok(Json(PaginatedResponse::new(
        following.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

/// Bookmarks of `username` visible to the caller
#[utoipa::path(
    get,
    path = "/profiles/{username}/bookmarks",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile username"), Pagination),
    responses((status = 200, description = "Visible bookmarks", body = PaginatedResponse<BookmarkResponse>)),
)]
#[tracing::instrument(skip_all)]
pub async fn list_profile_bookmarks(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
    caller: MaybeCurrentUser,
) -> Result<Json<PaginatedResponse<BookmarkResponse>>, Error> {
    let viewer = caller.viewer();
    let profile = find_visible_profile(&state, &username, viewer).await?;
    let (skip, limit) = pagination.params();

    let filter = BookmarkFilter::new(viewer, skip, limit).owned_by(profile.id);
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

/// Collections of `username` visible to the caller
#[utoipa::path(
    get,
    path = "/profiles/{username}/collections",
    tag = "profiles",
    params(("username" = String, Path, description = "Profile username"), Pagination),
    responses((status = 200, description = "Visible collections", body = PaginatedResponse<CollectionResponse>)),
)]
#[tracing::instrument(skip_all)]
pub async fn list_profile_collections(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
    caller: MaybeCurrentUser,
) -> Result<Json<PaginatedResponse<CollectionResponse>>, Error> {
    let viewer = caller.viewer();
    let profile = find_visible_profile(&state, &username, viewer).await?;
    let (skip, limit) = pagination.params();

    let filter = CollectionFilter::new(viewer, skip, limit).owned_by(profile.id);
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

/// List all profiles (admin)
#[utoipa::path(
    get,
    path = "/profiles",
    tag = "admin",
    params(ListProfilesQuery),
    responses((status = 200, description = "Profiles", body = PaginatedResponse<ProfileResponse>), (status = 403, description = "Not an admin")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn admin_list_profiles(
    State(state): State<AppState>,
    Query(query): Query<ListProfilesQuery>,
    _: RequiresPermission<resource::Profiles, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<ProfileResponse>>, Error> {
    let (skip, limit) = query.pagination.params();
    let filter = ProfileFilter::new(skip, limit).with_search(query.search);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);
    let profiles = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        profiles.into_iter().map(Into::into).collect(),
        total,
        skip,
        limit,
    )))
}

fn check_self_demotion(admin: UserId, target: UserId, update: &AdminProfileUpdate) -> Result<(), Error> {
    if admin != target {
        return Ok(());
    }
    if update.is_admin == Some(false) {
        return Err(Error::BadRequest {
            message: "You cannot remove your own admin flag".to_string(),
        });
    }
    if update.is_suspended == Some(true) {
        return Err(Error::BadRequest {
            message: "You cannot suspend yourself".to_string(),
        });
    }
    Ok(())
}

/// Change moderation flags of a profile (admin)
#[utoipa::path(
    patch,
    path = "/profiles/{id}",
    tag = "admin",
    request_body = AdminProfileUpdate,
    params(("id" = String, Path, description = "Profile ID")),
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Admins cannot demote or suspend themselves"),
        (status = 404, description = "No such profile"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn admin_update_profile(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    RequiresPermission(admin, _): RequiresPermission<resource::Profiles, operation::UpdateAll>,
    Json(update): Json<AdminProfileUpdate>,
) -> Result<Json<ProfileResponse>, Error> {
    check_self_demotion(admin.id, id, &update)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn)
        .update_flags(
            id,
            &ProfileFlagsUpdateDBRequest {
                is_admin: update.is_admin,
                is_moderator: update.is_moderator,
                is_suspended: update.is_suspended,
            },
        )
        .await?;

    tracing::info!(target_id = %id, admin_id = %admin.id, "Updated profile flags");
    Ok(Json(profile.into()))
}
