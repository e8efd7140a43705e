//! The CRUD surface shared by the content repositories.
//!
//! [`Profiles`](super::Profiles), [`Bookmarks`](super::Bookmarks),
//! [`Collections`](super::Collections) and [`AffiliateLinks`](super::AffiliateLinks)
//! implement it; queues, logs and aggregates expose purpose-built methods instead.
//! Reads here are unscoped. Callers that act for a viewer use the
//! visibility-aware methods on each repository.

use crate::db::errors::Result;

#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    /// Filter and pagination for [`Repository::list`]
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// `false` when no row matched
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Fails with [`DbError::NotFound`](crate::db::errors::DbError::NotFound) when no row matched
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
