//! Extractors resolving the caller of a request.
//!
//! Credentials are tried in order: an `Authorization: Bearer ls_...` API key,
//! then the session cookie. Either way the `profiles` row is re-read, so
//! flag changes (suspension, role changes) take effect on the next request.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::profiles::CurrentUser,
    auth::{api_keys::hash_api_key, session},
    db::{
        errors::DbError,
        handlers::{ApiKeys, Profiles, Repository},
    },
    errors::{Error, Result},
    types::UserId,
};

/// Extract the profile id from the JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(id)): Valid token found and verified
/// - Some(Err(error)): Cookie present but invalid or expired
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<UserId>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.native.session.cookie_name;

    let mut last_error = None;
    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(claims) => return Some(Ok(claims.sub)),
                // Expired tokens are expected; keep looking in case of duplicates
                Err(e) => last_error = Some(e),
            }
        }
    }
    last_error.map(Err)
}

/// Extract the profile id from an API key in the Authorization header
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(id)): Known key
/// - Some(Err(error)): Bearer token present but unknown
#[instrument(skip(parts, db))]
async fn try_api_key_auth(parts: &Parts, db: &PgPool) -> Option<Result<UserId>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let api_key = auth_str.strip_prefix("Bearer ")?.trim();

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };

    match ApiKeys::new(&mut conn).authenticate(&hash_api_key(api_key)).await {
        Ok(Some(key)) => Some(Ok(key.user_id)),
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("Invalid API key".to_string()),
        })),
        Err(e) => Some(Err(e.into())),
    }
}

/// Load the caller's profile with fresh flags
async fn load_profile(db: &PgPool, id: UserId) -> Result<CurrentUser> {
    let mut conn = db.acquire().await.map_err(DbError::from)?;
    let profile = Profiles::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or(Error::Unauthenticated { message: None })?;

    if profile.is_suspended {
        return Err(Error::Forbidden {
            message: "This account has been suspended".to_string(),
        });
    }

    Ok(CurrentUser::from(profile))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Each method returns Option<Result<UserId>>:
        // - None: the method is not applicable (no credentials present)
        // - Some(Ok(id)): authenticated
        // - Some(Err(error)): credentials present but invalid
        // A valid cookie still authenticates alongside an invalid API key.
        let mut auth_errors = Vec::new();

        match try_api_key_auth(parts, &state.db).await {
            Some(Ok(id)) => {
                debug!("Found API key authenticated profile: {}", id);
                return load_profile(&state.db, id).await;
            }
            Some(Err(e)) => {
                trace!("API key authentication failed: {:?}", e);
                auth_errors.push(("API key", e));
            }
            None => trace!("No API key authentication attempted"),
        }

        if state.config.auth.native.enabled {
            match try_jwt_session_auth(parts, &state.config) {
                Some(Ok(id)) => {
                    debug!("Found JWT session authenticated profile: {}", id);
                    return load_profile(&state.db, id).await;
                }
                Some(Err(e)) => {
                    trace!("JWT session authentication failed: {:?}", e);
                    auth_errors.push(("JWT session", e));
                }
                None => trace!("No JWT session authentication attempted"),
            }
        }

        if auth_errors.is_empty() {
            trace!("No authentication credentials found in request");
            return Err(Error::Unauthenticated { message: None });
        }

        trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
        // Surface server-side failures rather than masking them as 401
        match auth_errors.into_iter().find(|(_, e)| e.status_code().is_server_error()) {
            Some((_, e)) => Err(e),
            None => Err(Error::Unauthenticated { message: None }),
        }
    }
}

/// The caller if authenticated, `None` for anonymous requests. Invalid or
/// expired credentials and suspended accounts are treated as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeCurrentUser(pub Option<CurrentUser>);

impl MaybeCurrentUser {
    pub fn viewer(&self) -> crate::db::handlers::Viewer {
        self.0.as_ref().map(CurrentUser::viewer).unwrap_or_default()
    }
}

impl FromRequestParts<AppState> for MaybeCurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeCurrentUser(Some(user))),
            Err(e) if e.status_code().is_server_error() => Err(e),
            Err(_) => Ok(MaybeCurrentUser(None)),
        }
    }
}
