//! Affiliate link management and the public `/r/{code}` redirect.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use metrics::counter;
use tracing::{debug, warn};

use crate::{
    AppState,
    api::models::{
        affiliate_links::{
            AffiliateLinkCreate, AffiliateLinkResponse, AffiliateLinkStatsResponse, AffiliateLinkUpdate, ListAffiliateLinksQuery, StatsQuery,
            generate_short_code, validate_short_code,
        },
        bookmarks::validate_url,
        pagination::PaginatedResponse,
        profiles::CurrentUser,
    },
    auth::permissions::can_modify,
    config::Config,
    db::{
        handlers::{AffiliateLinks, Bookmarks, Repository, affiliate_links::AffiliateLinkFilter},
        models::affiliate_links::{
            AffiliateLinkCreateDBRequest, AffiliateLinkDBResponse, AffiliateLinkUpdateDBRequest, ClickMetadata, RedirectMiss,
        },
    },
    errors::{Error, Result},
    types::{AffiliateLinkId, Operation, Resource},
    webhooks::{events::WebhookEvent, service::emit},
};

fn short_url(config: &Config, short_code: &str) -> String {
    format!("{}/r/{short_code}", config.public_url.trim_end_matches('/'))
}

pub(crate) fn respond(config: &Config, link: AffiliateLinkDBResponse) -> AffiliateLinkResponse {
    let url = short_url(config, &link.short_code);
    AffiliateLinkResponse::new(link, url)
}

fn not_found(id: AffiliateLinkId) -> Error {
    Error::NotFound {
        resource: "Affiliate link".to_string(),
        id: id.to_string(),
    }
}

/// Links are private to their owner. Other callers without the `*All` grant get a 404.
async fn load_owned(state: &AppState, current_user: &CurrentUser, id: AffiliateLinkId, operation: Operation) -> Result<AffiliateLinkDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    match AffiliateLinks::new(&mut conn).get_by_id(id).await? {
        Some(link) if can_modify(current_user, Resource::AffiliateLinks, operation, link.owner_id) => Ok(link),
        _ => Err(not_found(id)),
    }
}

#[utoipa::path(
    get,
    path = "/affiliate-links",
    tag = "affiliate_links",
    params(ListAffiliateLinksQuery),
    responses((status = 200, description = "Own affiliate links", body = PaginatedResponse<AffiliateLinkResponse>)),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_affiliate_links(
    State(state): State<AppState>,
    Query(query): Query<ListAffiliateLinksQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<AffiliateLinkResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = AffiliateLinkFilter::new(skip, limit).owned_by(current_user.id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = AffiliateLinks::new(&mut conn);
    let links = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        links.into_iter().map(|l| respond(&state.config, l)).collect(),
        total,
        skip,
        limit,
    )))
}

/// Create an affiliate link
///
/// Without a custom `short_code` a random base62 code is generated, retrying
/// on collision up to `affiliate.max_generation_attempts` times.
#[utoipa::path(
    post,
    path = "/affiliate-links",
    tag = "affiliate_links",
    request_body = AffiliateLinkCreate,
    responses(
        (status = 201, description = "Link created", body = AffiliateLinkResponse),
        (status = 400, description = "Invalid URL, short code or expiry"),
        (status = 409, description = "Short code already taken"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_affiliate_link(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(create): Json<AffiliateLinkCreate>,
) -> Result<(StatusCode, Json<AffiliateLinkResponse>)> {
    let target_url = validate_url(&create.target_url)?;
    if create.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(Error::BadRequest {
            message: "expires_at must be in the future".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if let Some(bookmark_id) = create.bookmark_id {
        let bookmark = Bookmarks::new(&mut conn).get_by_id(bookmark_id).await?;
        if bookmark.is_none_or(|b| b.owner_id != current_user.id) {
            return Err(Error::BadRequest {
                message: "bookmark_id must reference one of your bookmarks".to_string(),
            });
        }
    }

    let mut repo = AffiliateLinks::new(&mut conn);
    let short_code = match create.short_code {
        Some(code) => {
            let code = validate_short_code(&code)?;
            if repo.short_code_exists(&code).await? {
                return Err(Error::Conflict {
                    message: format!("Short code '{code}' is already taken"),
                });
            }
            code
        }
        None => {
            let mut found = None;
            for attempt in 1..=state.config.affiliate.max_generation_attempts {
                let candidate = generate_short_code(state.config.affiliate.short_code_length);
                if !repo.short_code_exists(&candidate).await? {
                    found = Some(candidate);
                    break;
                }
                debug!(attempt, "Generated short code collided, retrying");
            }
            found.ok_or_else(|| Error::Internal {
                operation: "generate a unique short code".to_string(),
            })?
        }
    };

    let link = repo
        .create(&AffiliateLinkCreateDBRequest {
            owner_id: current_user.id,
            short_code,
            target_url,
            bookmark_id: create.bookmark_id,
            description: create.description,
            expires_at: create.expires_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(respond(&state.config, link))))
}

#[utoipa::path(
    get,
    path = "/affiliate-links/{id}",
    tag = "affiliate_links",
    params(("id" = String, Path, description = "Affiliate link ID")),
    responses((status = 200, description = "Affiliate link", body = AffiliateLinkResponse), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_affiliate_link(
    State(state): State<AppState>,
    Path(id): Path<AffiliateLinkId>,
    current_user: CurrentUser,
) -> Result<Json<AffiliateLinkResponse>> {
    let link = load_owned(&state, &current_user, id, Operation::ReadAll).await?;
    Ok(Json(respond(&state.config, link)))
}

#[utoipa::path(
    patch,
    path = "/affiliate-links/{id}",
    tag = "affiliate_links",
    request_body = AffiliateLinkUpdate,
    params(("id" = String, Path, description = "Affiliate link ID")),
    responses((status = 200, description = "Updated link", body = AffiliateLinkResponse), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_affiliate_link(
    State(state): State<AppState>,
    Path(id): Path<AffiliateLinkId>,
    current_user: CurrentUser,
    Json(update): Json<AffiliateLinkUpdate>,
) -> Result<Json<AffiliateLinkResponse>> {
    load_owned(&state, &current_user, id, Operation::UpdateAll).await?;

    let request = AffiliateLinkUpdateDBRequest {
        target_url: update.target_url.as_deref().map(validate_url).transpose()?,
        description: update.description,
        is_active: update.is_active,
        expires_at: update.expires_at,
    };
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let link = AffiliateLinks::new(&mut conn).update(id, &request).await?;
    Ok(Json(respond(&state.config, link)))
}

#[utoipa::path(
    delete,
    path = "/affiliate-links/{id}",
    tag = "affiliate_links",
    params(("id" = String, Path, description = "Affiliate link ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_affiliate_link(
    State(state): State<AppState>,
    Path(id): Path<AffiliateLinkId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    load_owned(&state, &current_user, id, Operation::DeleteAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !AffiliateLinks::new(&mut conn).delete(id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Daily click series for one link
#[utoipa::path(
    get,
    path = "/affiliate-links/{id}/stats",
    tag = "affiliate_links",
    params(("id" = String, Path, description = "Affiliate link ID"), StatsQuery),
    responses((status = 200, description = "Click stats", body = AffiliateLinkStatsResponse), (status = 404, description = "Not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_affiliate_link_stats(
    State(state): State<AppState>,
    Path(id): Path<AffiliateLinkId>,
    Query(query): Query<StatsQuery>,
    current_user: CurrentUser,
) -> Result<Json<AffiliateLinkStatsResponse>> {
    let link = load_owned(&state, &current_user, id, Operation::ReadAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let daily = AffiliateLinks::new(&mut conn).daily_clicks_for_link(id, query.days()).await?;

    Ok(Json(AffiliateLinkStatsResponse {
        id: link.id,
        short_code: link.short_code,
        total_clicks: link.click_count,
        clicks_in_window: daily.iter().map(|d| d.clicks).sum(),
        daily: daily.into_iter().map(Into::into).collect(),
    }))
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.chars().take(512).collect())
}

/// Follow a short link
///
/// Counts the click atomically and redirects with the configured status.
/// Unknown and deactivated codes are 404, expired ones 410.
#[utoipa::path(
    get,
    path = "/r/{code}",
    tag = "affiliate_links",
    params(("code" = String, Path, description = "Short code")),
    responses(
        (status = 302, description = "Redirect to the target URL"),
        (status = 404, description = "Unknown or inactive code"),
        (status = 410, description = "Link expired"),
    ),
)]
#[tracing::instrument(skip_all, fields(short_code = %code))]
pub async fn follow_short_link(State(state): State<AppState>, Path(code): Path<String>, headers: HeaderMap) -> Result<Response> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = AffiliateLinks::new(&mut conn);

    let Some(target) = repo.record_redirect(&code).await? else {
        let miss = repo.classify_miss(&code).await?;
        return Err(match miss {
            RedirectMiss::Expired => {
                counter!("linkshelf_redirects_total", "outcome" => "expired").increment(1);
                Error::Gone {
                    resource: "Link".to_string(),
                    id: code,
                }
            }
            RedirectMiss::Unknown | RedirectMiss::Inactive => {
                counter!("linkshelf_redirects_total", "outcome" => "not_found").increment(1);
                Error::NotFound {
                    resource: "Link".to_string(),
                    id: code,
                }
            }
        });
    };
    counter!("linkshelf_redirects_total", "outcome" => "redirected").increment(1);

    if state.config.affiliate.record_clicks {
        let metadata = ClickMetadata {
            referrer: header_string(&headers, header::REFERER),
            user_agent: header_string(&headers, header::USER_AGENT),
        };
        match repo.record_click(target.id, &metadata).await {
            Ok(()) => counter!("linkshelf_affiliate_clicks_recorded_total").increment(1),
            Err(e) => warn!(error = %e, "Failed to record click"),
        }
    }
    drop(conn);

    emit(
        &state.db,
        state.config.webhooks.enabled,
        target.owner_id,
        WebhookEvent::affiliate_link_clicked(&target),
    )
    .await;

    let status = StatusCode::from_u16(state.config.affiliate.redirect_status).unwrap_or(StatusCode::FOUND);
    Ok((status, [(header::LOCATION, target.target_url)]).into_response())
}
