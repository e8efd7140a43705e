//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries and row policy)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Row visibility
//!
//! Content rows (bookmarks, collections) carry an owner and `is_public` /
//! `is_hidden` flags. Every read that can return another profile's content
//! takes a [`handlers::Viewer`] and filters with the same predicate: the viewer
//! owns the row, or the row is public and not hidden, or the viewer is a
//! moderator or admin. Writes are always scoped to the owner in SQL.
//!
//! # Transactions
//!
//! Repositories wrap a `&mut PgConnection`, so they work equally on a pooled
//! connection or inside a transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Bookmarks::new(&mut tx);
//! let bookmark = repo.create(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded with [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
