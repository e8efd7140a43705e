//! API request and response data models.
//!
//! These types define the public JSON contract and are kept separate from the
//! database models in [`crate::db::models`], so storage and API can evolve
//! independently. All of them derive `utoipa::ToSchema` for the OpenAPI
//! document.
//!
//! - [`auth`]: registration, login and password payloads
//! - [`profiles`]: profiles, the caller identity and the follow graph
//! - [`bookmarks`], [`collections`], [`affiliate_links`]: owned content
//! - [`reports`]: moderation
//! - [`notifications`], [`feed`], [`trending`], [`dashboard`]: read models
//! - [`webhooks`], [`api_keys`]: integrations
//! - [`pagination`]: `skip` / `limit` shared by list endpoints

pub mod affiliate_links;
pub mod api_keys;
pub mod auth;
pub mod bookmarks;
pub mod collections;
pub mod config;
pub mod dashboard;
pub mod feed;
pub mod notifications;
pub mod pagination;
pub mod profiles;
pub mod reports;
pub mod trending;
pub mod webhooks;
