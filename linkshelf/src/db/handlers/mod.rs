//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed `PgConnection` (a pooled connection or an
//! open transaction), builds its queries with `sqlx`, and returns models from
//! [`crate::db::models`]. Entities with plain CRUD semantics implement the
//! [`Repository`] trait; the rest expose purpose-built methods.
//!
//! # Available Repositories
//!
//! - [`Profiles`]: Profiles, moderation flags and the follow graph
//! - [`Bookmarks`]: Bookmarks, feed candidates and tag statistics
//! - [`Collections`]: Collections and their ordered items
//! - [`AffiliateLinks`]: Short-code redirects and click tracking
//! - [`Reports`]: Moderation queue
//! - [`Notifications`]: In-app notifications, published with `pg_notify`
//! - [`ApiKeys`]: API key storage and lookup
//! - [`Webhooks`]: Webhook configuration and the delivery queue
//! - [`Trending`]: Tag window counts and the trending snapshot
//! - [`Analytics`]: Dashboard aggregates
//! - [`PasswordResetTokens`]: Password reset token lifecycle
//!
//! Reads of owned content take a [`Viewer`] and only return rows that viewer
//! may see.
//!
//! ```ignore
//! use linkshelf::db::handlers::{Bookmarks, Repository};
//!
//! let mut tx = pool.begin().await?;
//! let bookmark = Bookmarks::new(&mut tx).create(&request).await?;
//! tx.commit().await?;
//! ```

pub mod affiliate_links;
pub mod analytics;
pub mod api_keys;
pub mod bookmarks;
pub mod collections;
pub mod notifications;
pub mod password_reset_tokens;
pub mod profiles;
pub mod reports;
pub mod repository;
pub mod trending;
pub mod visibility;
pub mod webhooks;

pub use affiliate_links::AffiliateLinks;
pub use analytics::Analytics;
pub use api_keys::ApiKeys;
pub use bookmarks::Bookmarks;
pub use collections::Collections;
pub use notifications::Notifications;
pub use password_reset_tokens::PasswordResetTokens;
pub use profiles::Profiles;
pub use reports::Reports;
pub use repository::Repository;
pub use trending::Trending;
pub use visibility::Viewer;
pub use webhooks::Webhooks;
