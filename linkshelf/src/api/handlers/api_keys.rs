use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    AppState,
    api::models::api_keys::{ApiKeyCreate, ApiKeyInfoResponse, ApiKeyResponse},
    auth::{
        api_keys::generate_api_key,
        permissions::{RequiresPermission, operation, resource},
    },
    db::{handlers::ApiKeys, models::api_keys::ApiKeyCreateDBRequest},
    errors::{Error, Result},
    types::ApiKeyId,
};

const MAX_KEY_NAME_LEN: usize = 100;

/// Create an API key for the caller.
///
/// This is the only response that contains the plaintext key.
#[utoipa::path(
    post,
    path = "/api-keys",
    tag = "api_keys",
    request_body = ApiKeyCreate,
    responses(
        (status = 201, description = "API key created", body = ApiKeyResponse),
        (status = 400, description = "Invalid name"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_api_key(
    State(state): State<AppState>,
    RequiresPermission(current_user, _): RequiresPermission<resource::ApiKeys, operation::CreateOwn>,
    Json(data): Json<ApiKeyCreate>,
) -> Result<(StatusCode, Json<ApiKeyResponse>)> {
    let name = data.name.trim();
    if name.is_empty() || name.chars().count() > MAX_KEY_NAME_LEN {
        return Err(Error::BadRequest {
            message: format!("API key name must be 1 to {MAX_KEY_NAME_LEN} characters"),
        });
    }

    let generated = generate_api_key();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let key = ApiKeys::new(&mut conn)
        .create(&ApiKeyCreateDBRequest {
            user_id: current_user.id,
            name: name.to_string(),
            key_prefix: generated.prefix,
            key_hash: generated.hash,
        })
        .await?;

    tracing::info!(api_key_id = %key.id, "API key created");
    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            info: key.into(),
            key: generated.plaintext,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api-keys",
    tag = "api_keys",
    responses((status = 200, description = "The caller's API keys", body = [ApiKeyInfoResponse])),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    RequiresPermission(current_user, _): RequiresPermission<resource::ApiKeys, operation::ReadOwn>,
) -> Result<Json<Vec<ApiKeyInfoResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let keys = ApiKeys::new(&mut conn).list_by_user(current_user.id).await?;
    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

/// Revoke one of the caller's API keys
#[utoipa::path(
    delete,
    path = "/api-keys/{id}",
    tag = "api_keys",
    params(("id" = String, Path, description = "API key ID")),
    responses((status = 204, description = "API key revoked"), (status = 404, description = "API key not found")),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_api_key(
    State(state): State<AppState>,
    Path(id): Path<ApiKeyId>,
    RequiresPermission(current_user, _): RequiresPermission<resource::ApiKeys, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !ApiKeys::new(&mut conn).delete_for_user(id, current_user.id).await? {
        return Err(Error::NotFound {
            resource: "API key".to_string(),
            id: id.to_string(),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::profiles::ProfileResponse;
    use crate::test_utils::{create_test_app, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::header;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_key_authenticates_until_revoked(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let me = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        let config = create_test_config();
        let cookie = session_cookie_for(&me, &config);

        server
            .post("/api/v1/api-keys")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"name": "   "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .post("/api/v1/api-keys")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"name": "ci"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: ApiKeyResponse = response.json();
        assert!(created.key.starts_with("ls_"));
        assert!(created.key.starts_with(&created.info.key_prefix));

        let bearer = format!("Bearer {}", created.key);
        let profile: ProfileResponse = server.get("/api/v1/profiles/me").add_header(header::AUTHORIZATION, bearer.clone()).await.json();
        assert_eq!(profile.id, me.id);

        // Listing never exposes the key itself
        let listed = server.get("/api/v1/api-keys").add_header(header::COOKIE, cookie.clone()).await;
        assert!(!listed.text().contains(&created.key));
        let listed: Vec<ApiKeyInfoResponse> = listed.json();
        assert_eq!(listed.len(), 1);

        // Someone else cannot revoke it
        server
            .delete(&format!("/api/v1/api-keys/{}", created.info.id))
            .add_header(header::COOKIE, session_cookie_for(&other, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .delete(&format!("/api/v1/api-keys/{}", created.info.id))
            .add_header(header::COOKIE, cookie)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get("/api/v1/profiles/me")
            .add_header(header::AUTHORIZATION, bearer)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
