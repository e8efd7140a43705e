//! Shared fixtures for the in-crate tests.

use crate::{
    AppState, BackgroundServices,
    api::models::profiles::CurrentUser,
    auth::{api_keys::generate_api_key, session},
    config::{Config, EmailTransportConfig, LeaderElectionConfig},
    db::{
        handlers::{ApiKeys, Bookmarks, Collections, Profiles, Repository},
        models::{
            api_keys::ApiKeyCreateDBRequest,
            bookmarks::{BookmarkCreateDBRequest, BookmarkDBResponse},
            collections::{CollectionCreateDBRequest, CollectionDBResponse},
            profiles::{ProfileCreateDBRequest, ProfileDBResponse},
        },
    },
    types::UserId,
};
use axum_test::TestServer;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

pub async fn create_test_app(pool: PgPool) -> (TestServer, BackgroundServices) {
    let app = crate::Application::new_with_pool(create_test_config(), Some(pool))
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

/// Builds state without starting background services
pub fn create_test_state(pool: PgPool) -> AppState {
    AppState::builder().db(pool).config(create_test_config()).build()
}

pub fn create_test_config() -> Config {
    let email_dir = std::env::temp_dir().join(format!("linkshelf-test-emails-{}", std::process::id()));

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    };

    config.auth.native.enabled = true;
    config.auth.native.allow_registration = true;
    config.email.transport = EmailTransportConfig::File {
        path: email_dir.to_string_lossy().to_string(),
    };
    config.background_services.leader_election = LeaderElectionConfig { enabled: false };
    config.trending.enabled = false;

    // Deliveries in tests are driven through the admin trigger, not the poll loop
    config.webhooks.enabled = true;
    config.webhooks.poll_interval = Duration::from_secs(3600);
    config.webhooks.timeout_secs = 2;

    config
}

async fn insert_profile(pool: &PgPool, is_admin: bool, is_moderator: bool) -> ProfileDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let username = format!("user_{}", &Uuid::new_v4().simple().to_string()[..12]);

    Profiles::new(&mut conn)
        .create(&ProfileCreateDBRequest {
            email: format!("{username}@example.com"),
            display_name: Some("Test Profile".to_string()),
            username,
            password_hash: None,
            auth_source: "test".to_string(),
            is_admin,
            is_moderator,
        })
        .await
        .expect("Failed to create test profile")
}

pub async fn create_test_profile(pool: &PgPool) -> ProfileDBResponse {
    insert_profile(pool, false, false).await
}

pub async fn create_test_moderator(pool: &PgPool) -> ProfileDBResponse {
    insert_profile(pool, false, true).await
}

pub async fn create_test_admin(pool: &PgPool) -> ProfileDBResponse {
    insert_profile(pool, true, false).await
}

pub async fn create_test_bookmark(pool: &PgPool, owner_id: UserId, url: &str, tags: &[&str], is_public: bool) -> BookmarkDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Bookmarks::new(&mut conn)
        .create(&BookmarkCreateDBRequest {
            owner_id,
            url: url.to_string(),
            title: format!("Bookmark for {url}"),
            description: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_public,
        })
        .await
        .expect("Failed to create test bookmark")
}

pub async fn create_test_collection(pool: &PgPool, owner_id: UserId, name: &str, is_public: bool) -> CollectionDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Collections::new(&mut conn)
        .create(&CollectionCreateDBRequest {
            owner_id,
            name: name.to_string(),
            description: None,
            is_public,
        })
        .await
        .expect("Failed to create test collection")
}

/// Returns the plaintext key
pub async fn create_test_api_key(pool: &PgPool, user_id: UserId) -> String {
    let key = generate_api_key();
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    ApiKeys::new(&mut conn)
        .create(&ApiKeyCreateDBRequest {
            user_id,
            name: "test key".to_string(),
            key_prefix: key.prefix,
            key_hash: key.hash,
        })
        .await
        .expect("Failed to create test API key");
    key.plaintext
}

/// A `Cookie` header value carrying a valid session for `profile`
pub fn session_cookie_for(profile: &ProfileDBResponse, config: &Config) -> String {
    let user = CurrentUser::from(profile.clone());
    let token = session::create_session_token(&user, config).expect("Failed to create session token");
    format!("{}={}", config.auth.native.session.cookie_name, token)
}
