//! # linkshelf: social bookmarking
//!
//! `linkshelf` is a self-hostable service where people save links as bookmarks,
//! organize them into ordered collections, follow each other, and share
//! trackable short links. It exposes a JSON API, a live notification stream and
//! signed outbound webhooks.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for all persistence.
//!
//! ### Request Flow
//!
//! A request first reaches the router built by [`build_router`]. Protected handlers take a
//! [`CurrentUser`](api::models::profiles::CurrentUser) extractor, which accepts either an
//! `Authorization: Bearer ls_...` API key or the session cookie set at login. Handlers then
//! check role grants ([`auth::permissions`]) and talk to the database through the repositories in
//! [`db::handlers`]. Who may *see* a row (public, owned, hidden by a moderator) is enforced by
//! the repository queries themselves, so every listing applies the same rules.
//!
//! Side effects that other parties care about run after the originating transaction commits:
//!
//! - **Notifications** are inserted and announced with `pg_notify`. Every instance runs a
//!   listener ([`notifications::run_listener`]) that fans them out to open SSE streams.
//! - **Webhook deliveries** are enqueued in `webhook_deliveries` and sent by the dispatcher
//!   ([`webhooks::dispatcher`]) with Standard Webhooks signatures and a retry schedule.
//!
//! ### Background Services
//!
//! One instance, chosen by a PostgreSQL advisory lock, runs the trending refresher and the
//! webhook dispatcher. All instances serve HTTP and stream notifications.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use linkshelf::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = linkshelf::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     linkshelf::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod feed;
mod leader_election;
pub mod notifications;
mod openapi;
pub mod telemetry;
pub mod trending;
mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::{self, HeaderName, HeaderValue};
use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use moka::future::Cache;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::{
        handlers::{
            affiliate_links, api_keys, auth as auth_handlers, bookmarks, collections, config as config_handlers, dashboard, feed as feed_handlers,
            notifications as notification_handlers, profiles, reports, trending as trending_handlers, webhooks as webhook_handlers,
        },
        models::{dashboard::AdminDashboardResponse, profiles::normalize_username},
    },
    auth::{password, utils::generate_username},
    config::CorsOrigin,
    db::{handlers::Profiles, handlers::Repository, models::profiles::ProfileCreateDBRequest},
    notifications::NotificationHub,
    openapi::ApiDoc,
    webhooks::{DispatcherSlot, WebhookDispatcher},
};
pub use config::Config;
pub use types::{AffiliateLinkId, ApiKeyId, BookmarkId, CollectionId, ReportId, UserId};

/// How long an admin dashboard stays cached per `days` value
const DASHBOARD_CACHE_TTL: Duration = Duration::from_secs(60);

fn dashboard_cache() -> Cache<i32, AdminDashboardResponse> {
    Cache::builder().max_capacity(64).time_to_live(DASHBOARD_CACHE_TTL).build()
}

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from file and environment
/// - `notifications`: In-process fan-out feeding the SSE streams
/// - `webhook_dispatcher`: The leader's dispatcher, empty on followers
/// - `dashboard_cache`: Short-lived cache of admin dashboards keyed by window
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    #[builder(default = NotificationHub::new(256))]
    pub notifications: NotificationHub,
    #[builder(default)]
    pub webhook_dispatcher: DispatcherSlot,
    #[builder(default = dashboard_cache())]
    pub dashboard_cache: Cache<i32, AdminDashboardResponse>,
}

/// Get the linkshelf database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Username for the bootstrap admin: the email's local part when it is a
/// valid username, a generated one otherwise.
fn admin_username(email: &str) -> String {
    email
        .split('@')
        .next()
        .and_then(|local| normalize_username(local).ok())
        .unwrap_or_else(generate_username)
}

/// Create the initial admin profile if it doesn't exist.
///
/// Idempotent: an existing profile with this email keeps its id, gets the
/// admin flag back and has its password replaced when one is given.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let email = email.trim().to_lowercase();
    let password_hash = password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await?;
    let mut repo = Profiles::new(&mut tx);

    if let Some(existing) = repo.get_by_email(&email).await? {
        sqlx::query("UPDATE profiles SET is_admin = TRUE, password_hash = COALESCE($1, password_hash) WHERE id = $2")
            .bind(password_hash)
            .bind(existing.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(existing.id);
    }

    let mut username = admin_username(&email);
    if repo.username_taken(&username).await? {
        username = generate_username();
    }

    let created = repo
        .create(&ProfileCreateDBRequest {
            username,
            email: email.clone(),
            display_name: Some("Administrator".to_string()),
            password_hash,
            auth_source: "system".to_string(),
            is_admin: true,
            is_moderator: false,
        })
        .await?;

    tx.commit().await?;
    info!(user_id = %created.id, "Created initial admin profile");
    Ok(created.id)
}

/// Connect, run migrations and make sure the admin profile exists
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("database_url is not configured (set DATABASE_URL or LINKSHELF_DATABASE_URL)"))?;

    let settings = &config.database_pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(database_url)
        .await?;

    migrator().run(&pool).await?;

    create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut exposed = vec![http::header::LOCATION];
    for name in &config.auth.security.cors.exposed_headers {
        exposed.push(name.parse::<HeaderName>()?);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(exposed);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Routes under `/authentication`
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/authentication/register",
            get(auth_handlers::get_registration_info).post(auth_handlers::register),
        )
        .route("/authentication/login", get(auth_handlers::get_login_info).post(auth_handlers::login))
        .route("/authentication/logout", post(auth_handlers::logout))
        .route("/authentication/onboarding", post(auth_handlers::complete_onboarding))
        .route("/authentication/password-resets", post(auth_handlers::request_password_reset))
        .route(
            "/authentication/password-resets/{token_id}/confirm",
            post(auth_handlers::confirm_password_reset),
        )
        .route("/authentication/password-change", post(auth_handlers::change_password))
}

/// Member routes, nested at `/api/v1`
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(config_handlers::get_config))
        // Profiles and follows
        .route("/profiles/me", get(profiles::get_me).patch(profiles::update_me))
        .route("/profiles/{username}", get(profiles::get_profile))
        .route("/profiles/{username}/follow", post(profiles::follow).delete(profiles::unfollow))
        .route("/profiles/{username}/followers", get(profiles::list_followers))
        .route("/profiles/{username}/following", get(profiles::list_following))
        .route("/profiles/{username}/bookmarks", get(profiles::list_profile_bookmarks))
        .route("/profiles/{username}/collections", get(profiles::list_profile_collections))
        // Bookmarks
        .route("/bookmarks", get(bookmarks::list_bookmarks).post(bookmarks::create_bookmark))
        .route(
            "/bookmarks/{id}",
            get(bookmarks::get_bookmark)
                .patch(bookmarks::update_bookmark)
                .delete(bookmarks::delete_bookmark),
        )
        // Collections
        .route("/collections", get(collections::list_collections).post(collections::create_collection))
        .route(
            "/collections/{id}",
            get(collections::get_collection)
                .patch(collections::update_collection)
                .delete(collections::delete_collection),
        )
        .route("/collections/{id}/bookmarks", get(collections::list_collection_items))
        .route(
            "/collections/{id}/bookmarks/{bookmark_id}",
            post(collections::add_collection_item).delete(collections::remove_collection_item),
        )
        // Affiliate links
        .route(
            "/affiliate-links",
            get(affiliate_links::list_affiliate_links).post(affiliate_links::create_affiliate_link),
        )
        .route(
            "/affiliate-links/{id}",
            get(affiliate_links::get_affiliate_link)
                .patch(affiliate_links::update_affiliate_link)
                .delete(affiliate_links::delete_affiliate_link),
        )
        .route("/affiliate-links/{id}/stats", get(affiliate_links::get_affiliate_link_stats))
        // Reports
        .route("/reports", post(reports::create_report))
        // Notifications
        .route("/notifications", get(notification_handlers::list_notifications))
        .route("/notifications/unread-count", get(notification_handlers::unread_count))
        .route("/notifications/read-all", post(notification_handlers::mark_all_read))
        .route("/notifications/stream", get(notification_handlers::stream_notifications))
        .route("/notifications/{id}/read", post(notification_handlers::mark_read))
        // Discovery
        .route("/feed", get(feed_handlers::get_feed))
        .route("/trending", get(trending_handlers::list_trending))
        .route("/dashboard", get(dashboard::get_dashboard))
        // Webhooks
        .route("/webhooks", get(webhook_handlers::list_webhooks).post(webhook_handlers::create_webhook))
        .route(
            "/webhooks/{id}",
            get(webhook_handlers::get_webhook)
                .patch(webhook_handlers::update_webhook)
                .delete(webhook_handlers::delete_webhook),
        )
        .route("/webhooks/{id}/rotate-secret", post(webhook_handlers::rotate_secret))
        // API keys
        .route("/api-keys", get(api_keys::list_api_keys).post(api_keys::create_api_key))
        .route("/api-keys/{id}", axum::routing::delete(api_keys::delete_api_key))
}

/// Moderation and admin routes, nested at `/admin/api/v1`
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(profiles::admin_list_profiles))
        .route("/profiles/{id}", axum::routing::patch(profiles::admin_update_profile))
        .route("/reports", get(reports::list_reports))
        .route("/reports/{id}/resolve", post(reports::resolve_report))
        .route("/dashboard", get(dashboard::get_admin_dashboard))
        .route("/trending/refresh", post(trending_handlers::refresh_trending))
        .route("/webhooks/process", post(webhook_handlers::process_webhooks))
}

/// Build the main application router with all endpoints and middleware.
///
/// This function constructs the complete Axum router with:
/// - Authentication routes
/// - Member API at `/api/v1` and admin API at `/admin/api/v1`
/// - Short link redirects at `/r/{code}`
/// - OpenAPI JSON and the Scalar docs UI
/// - Optional Prometheus metrics
/// - CORS configuration
/// - Tracing middleware
pub async fn build_router(state: &mut AppState) -> anyhow::Result<Router> {
    let router = Router::new()
        .merge(auth_routes())
        .nest("/api/v1", user_routes())
        .nest("/admin/api/v1", admin_routes())
        .route("/r/{code}", get(affiliate_links::follow_short_link))
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// Holds the notification listener (every instance) and either the leader
/// tasks directly or the leader election loop that starts and stops them.
///
/// When dropped, the `drop_guard` cancels the shutdown token, signalling all
/// tasks to stop.
pub struct BackgroundServices {
    is_leader: Arc<AtomicBool>,
    background_tasks: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Whether this instance currently runs the leader tasks
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Gracefully shutdown all background tasks. With leader election the
    /// election task only returns once the leader tasks it started have ended.
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Leader election lock ID ("LNKSHELF" in ASCII)
const LEADER_LOCK_ID: i64 = 0x4C4E_4B53_4845_4C46_i64;

/// Leader tasks of one leadership term, stopped together when it ends
struct LeaderSession {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl LeaderSession {
    /// Cancel the term and wait for in-flight refreshes and drains to finish
    async fn stop(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Leader task ended abnormally");
            }
        }
    }
}

/// Start the trending refresher and the webhook dispatcher under `session`.
/// The dispatcher is placed in `slot` so the admin trigger can reach it.
async fn start_leader_tasks(pool: &PgPool, config: &Config, slot: &DispatcherSlot, session: &CancellationToken) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();

    if config.trending.enabled {
        handles.push(tokio::spawn(trending::run_refresher(pool.clone(), config.trending.clone(), session.clone())));
    } else {
        info!("Trending refresher disabled by configuration");
    }

    if config.webhooks.enabled {
        let dispatcher = WebhookDispatcher::spawn(pool.clone(), &config.webhooks, session.clone())?;
        *slot.lock().await = Some(dispatcher);
        handles.push(tokio::spawn(webhooks::run_dispatcher(slot.clone(), config.webhooks.poll_interval, session.clone())));
    } else {
        info!("Webhook dispatcher disabled by configuration");
    }

    Ok(handles)
}

/// Setup background services (notification listener, leader election, leader tasks)
async fn setup_background_services(
    pool: PgPool,
    config: Config,
    hub: NotificationHub,
    slot: DispatcherSlot,
    shutdown_token: CancellationToken,
) -> anyhow::Result<BackgroundServices> {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();
    let is_leader = Arc::new(AtomicBool::new(false));

    background_tasks.push(tokio::spawn(notifications::run_listener(pool.clone(), hub, shutdown_token.clone())));

    if !config.background_services.leader_election.enabled {
        info!("Launching without leader election: running as leader");
        is_leader.store(true, Ordering::Relaxed);
        background_tasks.extend(start_leader_tasks(&pool, &config, &slot, &shutdown_token).await?);
    } else {
        info!("Starting leader election - will attempt to acquire leadership");

        let leadership_session: Arc<tokio::sync::Mutex<Option<LeaderSession>>> = Arc::new(tokio::sync::Mutex::new(None));

        let gain = {
            let pool = pool.clone();
            let config = config.clone();
            let slot = slot.clone();
            let session = leadership_session.clone();
            let shutdown = shutdown_token.clone();
            move || {
                let pool = pool.clone();
                let config = config.clone();
                let slot = slot.clone();
                let session = session.clone();
                let token = shutdown.child_token();
                async move {
                    let mut current = session.lock().await;
                    // Stored before starting so a partial start is still torn down on loss
                    let leader = current.insert(LeaderSession {
                        token: token.clone(),
                        handles: Vec::new(),
                    });
                    leader.handles = start_leader_tasks(&pool, &config, &slot, &token).await?;
                    info!(tasks = leader.handles.len(), "Leader tasks started");
                    Ok(())
                }
            }
        };

        let lose = {
            let slot = slot.clone();
            let session = leadership_session.clone();
            move || {
                let slot = slot.clone();
                let session = session.clone();
                async move {
                    if let Some(leader) = session.lock().await.take() {
                        leader.stop().await;
                    }
                    *slot.lock().await = None;
                    info!("Leader tasks stopped");
                    Ok(())
                }
            }
        };

        background_tasks.push(tokio::spawn(leader_election::leader_election_task(
            pool.clone(),
            is_leader.clone(),
            LEADER_LOCK_ID,
            leader_election::LEADER_CHECK_INTERVAL,
            shutdown_token.clone(),
            gain,
            lose,
        )));
    }

    Ok(BackgroundServices {
        is_leader,
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    })
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects, runs migrations, bootstraps the
///    admin profile and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops all services
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing `pool` when given. A provided pool
    /// is assumed to be migrated already.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting linkshelf with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool).await?;
                pool
            }
            None => setup_database(&config).await?,
        };

        let hub = NotificationHub::new(config.notifications.channel_capacity);
        let slot = DispatcherSlot::default();
        let shutdown_token = CancellationToken::new();

        let bg_services = setup_background_services(pool.clone(), config.clone(), hub.clone(), slot.clone(), shutdown_token).await?;

        let mut app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .notifications(hub)
            .webhook_dispatcher(slot)
            .build();

        let router = build_router(&mut app_state).await?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "linkshelf listening on http://{}, available at {}",
            bind_addr, self.config.public_url
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config, create_test_profile, create_test_state, session_cookie_for};
    use axum::http::StatusCode;
    use axum_test::TestServer;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_initial_admin_user_is_idempotent(pool: PgPool) {
        let first = create_initial_admin_user("Root@Example.com", Some("first-password"), &pool).await.unwrap();
        let second = create_initial_admin_user("root@example.com", None, &pool).await.unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let admin = Profiles::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert!(admin.is_admin);
        assert_eq!(admin.username, "root");
        assert_eq!(admin.email, "root@example.com");
        // The password survives a restart without one
        let hash = admin.password_hash.clone().unwrap();
        assert!(password::verify_string("first-password", &hash).unwrap());

        create_initial_admin_user("root@example.com", Some("second-password"), &pool).await.unwrap();
        let admin = Profiles::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert!(password::verify_string("second-password", &admin.password_hash.unwrap()).unwrap());
    }

    #[test]
    fn test_admin_username_falls_back_to_generated() {
        assert_eq!(admin_username("site.owner@example.com").len(), "user_".len() + 8);
        assert_eq!(admin_username("ops_team@example.com"), "ops_team");
    }

    #[sqlx::test]
    async fn test_application_integration(pool: PgPool) {
        let (server, bg) = create_test_app(pool).await;
        assert!(bg.is_leader());

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");

        let doc: serde_json::Value = server.get("/api-docs/openapi.json").await.json();
        assert!(doc["paths"]["/api/v1/bookmarks"].is_object());
        server.get("/docs").await.assert_status_ok();

        // Metrics are off in the test configuration
        server.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
        bg.shutdown().await;
    }

    #[sqlx::test]
    async fn test_build_router_with_metrics_enabled(pool: PgPool) {
        let mut state = create_test_state(pool.clone());
        state.config.enable_metrics = true;
        let server = TestServer::new(build_router(&mut state).await.unwrap()).unwrap();

        server.get("/healthz").await.assert_status_ok();

        let owner = create_test_profile(&pool).await;
        server
            .post("/api/v1/affiliate-links")
            .add_header(http::header::COOKIE, session_cookie_for(&owner, &state.config))
            .json(&serde_json::json!({"target_url": "https://shop.example.com/", "short_code": "metered"}))
            .await
            .assert_status(StatusCode::CREATED);
        server.get("/r/metered").await.assert_status(StatusCode::FOUND);

        let metrics = server.get("/internal/metrics").await;
        metrics.assert_status_ok();
        let body = metrics.text();
        assert!(body.contains("# TYPE") || body.contains("# HELP"));
        assert!(body.contains("linkshelf_redirects_total"));
        assert!(body.contains("linkshelf_affiliate_clicks_recorded_total"));
    }

    #[test]
    fn test_cors_rejects_bad_exposed_header() {
        let mut config = create_test_config();
        assert!(create_cors_layer(&config).is_ok());
        config.auth.security.cors.exposed_headers = vec!["not a header".to_string()];
        assert!(create_cors_layer(&config).is_err());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_leader_tasks_stop_with_their_term(pool: PgPool) {
        let mut config = create_test_config();
        config.background_services.leader_election.enabled = true;
        config.trending.enabled = true;

        let slot = DispatcherSlot::default();
        let bg = setup_background_services(pool, config, NotificationHub::new(16), slot.clone(), CancellationToken::new())
            .await
            .unwrap();

        for _ in 0..100 {
            if bg.is_leader() && slot.lock().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(bg.is_leader());
        assert!(slot.lock().await.is_some());

        tokio::time::timeout(Duration::from_secs(10), bg.shutdown())
            .await
            .expect("background services did not stop");
        // The loss callback ran to completion before shutdown returned
        assert!(slot.lock().await.is_none());
    }
}
