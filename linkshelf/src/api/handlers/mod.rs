//! HTTP request handlers for all API endpoints.
//!
//! Handlers are grouped by resource. Each one extracts and validates its input,
//! checks role grants through [`crate::auth::permissions`], calls the
//! repositories in [`crate::db::handlers`] and maps the result to an API model.
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, logout, onboarding and password management
//! - [`profiles`]: Profiles, follows and moderator profile updates
//! - [`bookmarks`]: Bookmark CRUD with visibility and tag filters
//! - [`collections`]: Collections and their ordered bookmark lists
//! - [`affiliate_links`]: Short links, click stats and the `/r/{code}` redirect
//! - [`reports`]: Content reports and their resolution
//! - [`notifications`]: Notification inbox and the SSE stream
//! - [`feed`]: Personalized feed
//! - [`trending`]: Trending tags and the manual refresh
//! - [`dashboard`]: Owner and admin dashboards
//! - [`webhooks`]: Webhook endpoints and the manual delivery trigger
//! - [`api_keys`]: API key creation, listing and revocation
//! - [`config`]: Public site configuration
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Result`], whose error type renders as a JSON
//! body with the matching HTTP status.

pub mod affiliate_links;
pub mod api_keys;
pub mod auth;
pub mod bookmarks;
pub mod collections;
pub mod config;
pub mod dashboard;
pub mod feed;
pub mod notifications;
pub mod profiles;
pub mod reports;
pub mod trending;
pub mod webhooks;
