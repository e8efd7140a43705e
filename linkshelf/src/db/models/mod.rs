//! Database record models matching table schemas.
//!
//! These models are used by repositories to return query results and accept
//! insertion/update data. They are distinct from the API models in
//! [`crate::api::models`] so storage and wire formats can evolve separately.
//!
//! - [`profiles`]: Profiles, moderation flags and the follow graph
//! - [`bookmarks`]: Bookmarks and feed candidates
//! - [`collections`]: Named, ordered groups of bookmarks
//! - [`affiliate_links`]: Short-code redirects and their click log
//! - [`reports`]: Moderation reports
//! - [`notifications`]: In-app notifications
//! - [`api_keys`]: API keys for programmatic access
//! - [`webhooks`]: Webhook configuration and delivery queue
//! - [`trending`]: Trending topic snapshots
//! - [`analytics`]: Dashboard aggregates
//! - [`password_reset_tokens`]: Time-limited password reset tokens

pub mod affiliate_links;
pub mod analytics;
pub mod api_keys;
pub mod bookmarks;
pub mod collections;
pub mod notifications;
pub mod password_reset_tokens;
pub mod profiles;
pub mod reports;
pub mod trending;
pub mod webhooks;
