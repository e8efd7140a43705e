//! Registration, login, onboarding and password flows.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, ChangePasswordRequest, CookieResponse, LoginInfo, LoginRequest, LoginResponse,
            LogoutResponse, PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse, RegisterRequest, RegisterResponse,
            RegistrationInfo,
        },
        profiles::{CurrentUser, OnboardingRequest, ProfileResponse, normalize_username},
    },
    auth::{password, session, utils},
    db::{
        handlers::{PasswordResetTokens, Profiles, Repository},
        models::profiles::{OnboardingDBRequest, ProfileCreateDBRequest, ProfileDBResponse, ProfileUpdateDBRequest},
    },
    email::EmailService,
    errors::Error,
};

const GENERATED_USERNAME_ATTEMPTS: usize = 5;

fn require_native_auth(state: &AppState) -> Result<(), Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    Ok(())
}

fn normalize_email(raw: &str) -> Result<String, Error> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace) => Ok(email),
        _ => Err(Error::BadRequest {
            message: "Invalid email address".to_string(),
        }),
    }
}

async fn hash_password(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || password::hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

async fn verify_password(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

fn signed_in(profile: ProfileDBResponse, state: &AppState, status: StatusCode, message: &str) -> Result<CookieResponse<AuthResponse>, Error> {
    let current_user = CurrentUser::from(profile.clone());
    let token = session::create_session_token(&current_user, &state.config)?;

    Ok(CookieResponse {
        status,
        body: AuthResponse {
            user: ProfileResponse::from(profile),
            message: message.to_string(),
        },
        cookie: session::session_cookie(&token, &state.config),
    })
}

/// Get registration information
#[utoipa::path(
    get,
    path = "/authentication/register",
    tag = "authentication",
    responses(
        (status = 200, description = "Registration info", body = RegistrationInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_registration_info(State(state): State<AppState>) -> Result<Json<RegistrationInfo>, Error> {
    let enabled = state.config.auth.native.enabled && state.config.auth.native.allow_registration;
    Ok(Json(RegistrationInfo {
        enabled,
        message: if enabled {
            "Registration is enabled".to_string()
        } else {
            "Registration is disabled".to_string()
        },
    }))
}

/// Register a new profile
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "Profile registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email or username already in use"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    require_native_auth(&state)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "Registration is disabled".to_string(),
        });
    }

    password::validate_password(&request.password, &state.config.auth.native.password)?;
    let email = normalize_email(&request.email)?;
    let requested_username = request.username.as_deref().map(normalize_username).transpose()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut tx);

    if repo.get_by_email(&email).await?.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let username = match requested_username {
        Some(username) => username,
        None => {
            let mut generated = None;
            for _ in 0..GENERATED_USERNAME_ATTEMPTS {
                let candidate = utils::generate_username();
                if !repo.username_taken(&candidate).await? {
                    generated = Some(candidate);
                    break;
                }
            }
            generated.ok_or_else(|| Error::Internal {
                operation: "generate a free username".to_string(),
            })?
        }
    };

    let password_hash = hash_password(request.password).await?;
    let display_name = request.display_name.or_else(|| utils::display_name_from_email(&email));

    let profile = repo
        .create(&ProfileCreateDBRequest {
            username,
            email,
            display_name,
            password_hash: Some(password_hash),
            auth_source: "native".to_string(),
            is_admin: false,
            is_moderator: false,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(user_id = %profile.id, "Registered profile");
    signed_in(profile, &state, StatusCode::CREATED, "Registration successful")
}

/// Get login information
#[utoipa::path(
    get,
    path = "/authentication/login",
    tag = "authentication",
    responses(
        (status = 200, description = "Login info", body = LoginInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_login_info(State(state): State<AppState>) -> Result<Json<LoginInfo>, Error> {
    Ok(Json(LoginInfo {
        enabled: state.config.auth.native.enabled,
        message: if state.config.auth.native.enabled {
            "Native login is enabled".to_string()
        } else {
            "Native login is disabled".to_string()
        },
    }))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account suspended"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state)?;
    let invalid = || Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);

    let profile = repo.get_by_email(request.email.trim()).await?.ok_or_else(invalid)?;
    let hash = profile.password_hash.clone().ok_or_else(invalid)?;

    if !verify_password(request.password, hash).await? {
        return Err(invalid());
    }
    // Checked after the password so suspension does not reveal which emails exist
    if profile.is_suspended {
        return Err(Error::Forbidden {
            message: "This account has been suspended".to_string(),
        });
    }

    repo.touch_last_login(profile.id).await?;
    signed_in(profile, &state, StatusCode::OK, "Login successful")
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    Ok(CookieResponse {
        status: StatusCode::OK,
        body: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: session::expired_session_cookie(&state.config),
    })
}

/// Complete onboarding: choose a username and fill in the profile
#[utoipa::path(
    post,
    path = "/authentication/onboarding",
    request_body = OnboardingRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Onboarding complete", body = ProfileResponse),
        (status = 400, description = "Invalid username"),
        (status = 409, description = "Username taken or already onboarded"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn complete_onboarding(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<OnboardingRequest>,
) -> Result<Json<ProfileResponse>, Error> {
    if current_user.onboarded {
        return Err(Error::Conflict {
            message: "Onboarding has already been completed".to_string(),
        });
    }
    let username = normalize_username(&request.username)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);

    if username != current_user.username && repo.username_taken(&username).await? {
        return Err(Error::Conflict {
            message: "This username is already taken".to_string(),
        });
    }

    let profile = repo
        .complete_onboarding(
            current_user.id,
            &OnboardingDBRequest {
                username,
                display_name: request.display_name,
                bio: request.bio,
                avatar_url: request.avatar_url,
            },
        )
        .await?
        .ok_or_else(|| Error::Conflict {
            message: "Onboarding has already been completed".to_string(),
        })?;

    Ok(Json(ProfileResponse::from(profile)))
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset email sent if the account exists", body = PasswordResetResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // The response is identical whether or not the account exists
    let profile = Profiles::new(&mut tx).get_by_email(request.email.trim()).await?;
    if let Some(profile) = profile.filter(|p| p.password_hash.is_some() && !p.is_suspended) {
        let (raw_token, token) = PasswordResetTokens::new(&mut tx).create_for_user(profile.id, &state.config).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        let sent = match EmailService::new(&state.config) {
            Ok(service) => {
                service
                    .send_password_reset_email(&profile.email, profile.display_name.as_deref(), &token.id, &raw_token)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(error = %e, "Failed to send password reset email");
        }
    }

    Ok(Json(PasswordResetResponse {
        message: "If an account with that email exists, a password reset link has been sent.".to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/{token_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    params(("token_id" = String, Path, description = "Reset token ID from the email link")),
    responses(
        (status = 200, description = "Password reset successful", body = PasswordResetResponse),
        (status = 400, description = "Invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    require_native_auth(&state)?;
    password::validate_password(&request.new_password, &state.config.auth.native.password)?;

    let new_password_hash = hash_password(request.new_password).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let token = PasswordResetTokens::new(&mut tx)
        .find_valid_token_by_id(token_id, &request.token)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Invalid or expired reset token".to_string(),
        })?;

    Profiles::new(&mut tx)
        .update(
            token.user_id,
            &ProfileUpdateDBRequest {
                password_hash: Some(new_password_hash),
                ..Default::default()
            },
        )
        .await?;

    // Invalidate every outstanding token, including this one
    PasswordResetTokens::new(&mut tx).invalidate_for_user(token.user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}

/// Change password for the authenticated profile
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Current password is incorrect"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut conn);

    let profile = repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::Unauthenticated {
        message: Some("Profile not found".to_string()),
    })?;
    let hash = profile.password_hash.ok_or_else(|| Error::BadRequest {
        message: "This account has no password to change".to_string(),
    })?;

    if !verify_password(request.current_password, hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }
    password::validate_password(&request.new_password, &state.config.auth.native.password)?;

    let new_password_hash = hash_password(request.new_password).await?;
    repo.update(
        current_user.id,
        &ProfileUpdateDBRequest {
            password_hash: Some(new_password_hash),
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config, create_test_profile, session_cookie_for};
    use axum::http::header;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_and_login(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "New.User@Example.com", "password": "correct horse battery"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert!(response.headers().get(header::SET_COOKIE).is_some());

        let body: AuthResponse = response.json();
        assert_eq!(body.user.email, "new.user@example.com");
        assert!(body.user.username.starts_with("user_"));
        assert_eq!(body.user.display_name.as_deref(), Some("new.user"));
        assert!(body.user.onboarded_at.is_none());

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "new.user@example.com", "password": "correct horse battery"}))
            .await;
        response.assert_status_ok();
        let body: AuthResponse = response.json();
        assert_eq!(body.message, "Login successful");

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "new.user@example.com", "password": "wrong password"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_register_rejects_duplicates_and_short_passwords(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        let first = json!({"email": "dup@example.com", "password": "long enough pw", "username": "dupe"});
        server.post("/authentication/register").json(&first).await.assert_status(StatusCode::CREATED);

        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "DUP@example.com", "password": "long enough pw"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "other@example.com", "password": "long enough pw", "username": "dupe"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "short@example.com", "password": "x"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_register_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.auth.native.allow_registration = false;
        let state = AppState::builder().db(pool).config(config).build();
        let app = axum::Router::new()
            .route("/register", axum::routing::post(register).get(get_registration_info))
            .with_state(state);
        let server = axum_test::TestServer::new(app).unwrap();

        let info: RegistrationInfo = server.get("/register").await.json();
        assert!(!info.enabled);

        let response = server
            .post("/register")
            .json(&json!({"email": "a@example.com", "password": "long enough pw"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_suspended_profile_cannot_login(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        server
            .post("/authentication/register")
            .json(&json!({"email": "gone@example.com", "password": "long enough pw"}))
            .await
            .assert_status(StatusCode::CREATED);
        sqlx::query("UPDATE profiles SET is_suspended = TRUE WHERE email = 'gone@example.com'")
            .execute(&pool)
            .await
            .unwrap();

        let response = server
            .post("/authentication/login")
            .json(&json!({"email": "gone@example.com", "password": "long enough pw"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    async fn test_logout_expires_cookie(pool: PgPool) {
        let (server, _bg) = create_test_app(pool).await;
        let response = server.post("/authentication/logout").await;
        response.assert_status_ok();
        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[sqlx::test]
    async fn test_onboarding_once(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let profile = create_test_profile(&pool).await;
        let cookie = session_cookie_for(&profile, &create_test_config());

        let response = server
            .post("/authentication/onboarding")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"username": "Fresh_Name", "bio": "I collect links"}))
            .await;
        response.assert_status_ok();
        let body: ProfileResponse = response.json();
        assert_eq!(body.username, "fresh_name");
        assert_eq!(body.bio.as_deref(), Some("I collect links"));
        assert!(body.onboarded_at.is_some());

        let response = server
            .post("/authentication/onboarding")
            .add_header(header::COOKIE, cookie)
            .json(&json!({"username": "another_name"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        server
            .post("/authentication/onboarding")
            .json(&json!({"username": "anonymous"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_password_reset_flow(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        server
            .post("/authentication/register")
            .json(&json!({"email": "forgetful@example.com", "password": "original password"}))
            .await
            .assert_status(StatusCode::CREATED);

        // Unknown emails get the same answer
        server
            .post("/authentication/password-resets")
            .json(&json!({"email": "nobody@example.com"}))
            .await
            .assert_status_ok();

        let user_id: Uuid = sqlx::query_scalar("SELECT id FROM profiles WHERE email = 'forgetful@example.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let (raw_token, token) = PasswordResetTokens::new(&mut conn)
            .create_for_user(user_id, &create_test_config())
            .await
            .unwrap();

        server
            .post(&format!("/authentication/password-resets/{}/confirm", token.id))
            .json(&json!({"token": "wrong", "new_password": "brand new password"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post(&format!("/authentication/password-resets/{}/confirm", token.id))
            .json(&json!({"token": raw_token, "new_password": "brand new password"}))
            .await
            .assert_status_ok();

        // Tokens are single use
        server
            .post(&format!("/authentication/password-resets/{}/confirm", token.id))
            .json(&json!({"token": raw_token, "new_password": "another password"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/authentication/login")
            .json(&json!({"email": "forgetful@example.com", "password": "brand new password"}))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    async fn test_change_password(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let response = server
            .post("/authentication/register")
            .json(&json!({"email": "changer@example.com", "password": "first password"}))
            .await;
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        server
            .post("/authentication/password-change")
            .add_header(header::COOKIE, cookie.clone())
            .json(&json!({"current_password": "not it", "new_password": "second password"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/authentication/password-change")
            .add_header(header::COOKIE, cookie)
            .json(&json!({"current_password": "first password", "new_password": "second password"}))
            .await
            .assert_status_ok();

        server
            .post("/authentication/login")
            .json(&json!({"email": "changer@example.com", "password": "second password"}))
            .await
            .assert_status_ok();
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Someone@Example.COM ").unwrap(), "someone@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@localhost").is_err());
    }
}
