//! HTTP handlers for webhook management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    AppState,
    api::models::{
        profiles::CurrentUser,
        webhooks::{WebhookCreate, WebhookResponse, WebhookUpdate, WebhookWithSecretResponse, validate_event_types, validate_webhook_url},
    },
    auth::permissions::{RequiresPermission, can_modify, operation, resource},
    db::{
        handlers::Webhooks,
        models::webhooks::{Webhook, WebhookCreateDBRequest, WebhookId, WebhookUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, Resource},
    webhooks::{DispatchSummary, WebhookDispatcher, signing},
};

fn not_found(id: WebhookId) -> Error {
    Error::NotFound {
        resource: "Webhook".to_string(),
        id: id.to_string(),
    }
}

/// Load a webhook the caller may act on. Other users' webhooks read as missing.
async fn load_owned(state: &AppState, current_user: &CurrentUser, id: WebhookId, operation: Operation) -> Result<Webhook> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    match Webhooks::new(&mut conn).get_by_id(id).await? {
        Some(webhook) if can_modify(current_user, Resource::Webhooks, operation, webhook.user_id) => Ok(webhook),
        _ => Err(not_found(id)),
    }
}

/// List the caller's webhooks.
#[utoipa::path(
    get,
    path = "/webhooks",
    tag = "webhooks",
    responses(
        (status = 200, description = "List of webhooks", body = [WebhookResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    RequiresPermission(current_user, _): RequiresPermission<resource::Webhooks, operation::ReadOwn>,
) -> Result<Json<Vec<WebhookResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let webhooks = Webhooks::new(&mut conn).list_by_user(current_user.id).await?;
    Ok(Json(webhooks.into_iter().map(Into::into).collect()))
}

/// Create a webhook. The signing secret is returned only here and on rotation.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "webhooks",
    request_body = WebhookCreate,
    responses(
        (status = 201, description = "Webhook created", body = WebhookWithSecretResponse),
        (status = 400, description = "Invalid URL or event type"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn create_webhook(
    State(state): State<AppState>,
    RequiresPermission(current_user, _): RequiresPermission<resource::Webhooks, operation::CreateOwn>,
    Json(request): Json<WebhookCreate>,
) -> Result<(StatusCode, Json<WebhookWithSecretResponse>)> {
    let url = validate_webhook_url(&request.url)?;
    let event_types = validate_event_types(request.event_types)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let webhook = Webhooks::new(&mut conn)
        .create(&WebhookCreateDBRequest {
            user_id: current_user.id,
            url,
            secret: signing::generate_secret(),
            event_types,
            description: request.description,
        })
        .await?;

    tracing::info!(webhook_id = %webhook.id, "Webhook created");
    Ok((StatusCode::CREATED, Json(webhook.into())))
}

#[utoipa::path(
    get,
    path = "/webhooks/{id}",
    tag = "webhooks",
    params(("id" = String, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "Webhook details", body = WebhookResponse),
        (status = 404, description = "Webhook not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn get_webhook(State(state): State<AppState>, Path(id): Path<WebhookId>, current_user: CurrentUser) -> Result<Json<WebhookResponse>> {
    let webhook = load_owned(&state, &current_user, id, Operation::ReadAll).await?;
    Ok(Json(webhook.into()))
}

/// Update a webhook's URL, enabled flag, event filter or description.
#[utoipa::path(
    patch,
    path = "/webhooks/{id}",
    tag = "webhooks",
    params(("id" = String, Path, description = "Webhook ID")),
    request_body = WebhookUpdate,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookResponse),
        (status = 400, description = "Invalid URL or event type"),
        (status = 404, description = "Webhook not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<WebhookId>,
    current_user: CurrentUser,
    Json(request): Json<WebhookUpdate>,
) -> Result<Json<WebhookResponse>> {
    let url = request.url.as_deref().map(validate_webhook_url).transpose()?;
    let event_types = match request.event_types {
        Some(types) => Some(validate_event_types(types)?),
        None => None,
    };

    load_owned(&state, &current_user, id, Operation::UpdateAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let webhook = Webhooks::new(&mut conn)
        .update(
            id,
            &WebhookUpdateDBRequest {
                url,
                enabled: request.enabled,
                event_types,
                description: request.description,
            },
        )
        .await?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(webhook.into()))
}

#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    tag = "webhooks",
    params(("id" = String, Path, description = "Webhook ID")),
    responses((status = 204, description = "Webhook deleted"), (status = 404, description = "Webhook not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn delete_webhook(State(state): State<AppState>, Path(id): Path<WebhookId>, current_user: CurrentUser) -> Result<StatusCode> {
    load_owned(&state, &current_user, id, Operation::DeleteAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Webhooks::new(&mut conn).delete(id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the signing secret. The old secret stops working immediately.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/rotate-secret",
    tag = "webhooks",
    params(("id" = String, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "New secret", body = WebhookWithSecretResponse),
        (status = 404, description = "Webhook not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn rotate_secret(
    State(state): State<AppState>,
    Path(id): Path<WebhookId>,
    current_user: CurrentUser,
) -> Result<Json<WebhookWithSecretResponse>> {
    load_owned(&state, &current_user, id, Operation::UpdateAll).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let webhook = Webhooks::new(&mut conn)
        .rotate_secret(id, &signing::generate_secret())
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(webhook_id = %id, "Webhook secret rotated");
    Ok(Json(webhook.into()))
}

/// Deliver everything currently due and wait for the results. Runs on the
/// leader's dispatcher when this instance holds one, otherwise on a
/// short-lived dispatcher of its own.
#[utoipa::path(
    post,
    path = "/webhooks/process",
    tag = "admin",
    responses(
        (status = 200, description = "Dispatch counters", body = DispatchSummary),
        (status = 400, description = "Webhooks are disabled"),
        (status = 403, description = "Not an admin"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[instrument(skip_all)]
pub async fn process_webhooks(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Webhooks, operation::UpdateAll>,
) -> Result<Json<DispatchSummary>> {
    if !state.config.webhooks.enabled {
        return Err(Error::BadRequest {
            message: "Webhooks are disabled".to_string(),
        });
    }

    let mut slot = state.webhook_dispatcher.lock().await;
    let summary = match slot.as_mut() {
        Some(dispatcher) => dispatcher.process_pending().await,
        None => {
            drop(slot);
            let shutdown = CancellationToken::new();
            let mut dispatcher = WebhookDispatcher::spawn(state.db.clone(), &state.config.webhooks, shutdown.clone())
                .map_err(|e| Error::Internal {
                    operation: format!("start webhook dispatcher: {e}"),
                })?;
            let summary = dispatcher.process_pending().await;
            shutdown.cancel();
            summary
        }
    };

    tracing::info!(?summary, "Processed pending webhook deliveries");
    Ok(Json(summary))
}
