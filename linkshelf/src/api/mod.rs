//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): Registration, login, password resets
//! - **Members** (`/api/v1/*`): Profiles, bookmarks, collections, affiliate links,
//!   notifications, feed, trending, dashboard, webhooks and API keys
//! - **Moderation** (`/admin/api/v1/*`): Profile flags, the report queue, the
//!   platform dashboard and manual background triggers
//! - **Short links** (`/r/{code}`): Public redirects
//!
//! # OpenAPI Documentation
//!
//! Every endpoint is annotated with `utoipa`. The document is served at
//! `/api-docs/openapi.json` and rendered at `/docs`.

pub mod handlers;
pub mod models;
