//! Database repository for bookmarks.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        repository::Repository,
        visibility::{Viewer, push_visibility},
    },
    models::bookmarks::{BookmarkCreateDBRequest, BookmarkDBResponse, BookmarkUpdateDBRequest, FeedCandidate},
};
use crate::types::{BookmarkId, UserId, abbrev_uuid};

const SELECT_BOOKMARKS: &str = "SELECT b.*, p.username AS owner_username FROM bookmarks b JOIN profiles p ON p.id = b.owner_id";

/// Filter for listing bookmarks. Rows are always restricted to what `viewer` can see.
#[derive(Debug, Clone)]
pub struct BookmarkFilter {
    pub skip: i64,
    pub limit: i64,
    pub viewer: Viewer,
    pub owner_id: Option<UserId>,
    pub tag: Option<String>,
    /// Case-insensitive substring of title or URL
    pub search: Option<String>,
}

impl BookmarkFilter {
    pub fn new(viewer: Viewer, skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            viewer,
            owner_id: None,
            tag: None,
            search: None,
        }
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
        self
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.filter(|s| !s.trim().is_empty());
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        push_visibility(query, "b", self.viewer, true);

        if let Some(owner_id) = self.owner_id {
            query.push(" AND b.owner_id = ");
            query.push_bind(owner_id);
        }

        if let Some(ref tag) = self.tag {
            query.push(" AND ");
            query.push_bind(tag.clone());
            query.push(" = ANY(b.tags)");
        }

        if let Some(ref search) = self.search {
            let pattern = format!("%{}%", search.trim());
            query.push(" AND (b.title ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR b.url ILIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
    }
}

pub struct Bookmarks<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Bookmarks<'c> {
    type CreateRequest = BookmarkCreateDBRequest;
    type UpdateRequest = BookmarkUpdateDBRequest;
    type Response = BookmarkDBResponse;
    type Id = BookmarkId;
    type Filter = BookmarkFilter;

    #[instrument(skip(self, request), fields(owner_id = %abbrev_uuid(&request.owner_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let bookmark = sqlx::query_as::<_, BookmarkDBResponse>(
            r#"
            WITH inserted AS (
                INSERT INTO bookmarks (owner_id, url, title, description, tags, is_public)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            )
            SELECT b.*, p.username AS owner_username
            FROM inserted b JOIN profiles p ON p.id = b.owner_id
            "#,
        )
        .bind(request.owner_id)
        .bind(&request.url)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.tags)
        .bind(request.is_public)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(bookmark)
    }

    #[instrument(skip(self), fields(bookmark_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let bookmark = sqlx::query_as::<_, BookmarkDBResponse>(&format!("{SELECT_BOOKMARKS} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(bookmark)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(SELECT_BOOKMARKS);
        query.push(" WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY b.created_at DESC, b.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let bookmarks = query.build_query_as::<BookmarkDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(bookmarks)
    }

    #[instrument(skip(self), fields(bookmark_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(bookmark_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let bookmark = sqlx::query_as::<_, BookmarkDBResponse>(
            r#"
            WITH updated AS (
                UPDATE bookmarks SET
                    title = COALESCE($2, title),
                    description = COALESCE($3, description),
                    tags = COALESCE($4, tags),
                    is_public = COALESCE($5, is_public),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT b.*, p.username AS owner_username
            FROM updated b JOIN profiles p ON p.id = b.owner_id
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.tags)
        .bind(request.is_public)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(bookmark)
    }
}

impl<'c> Bookmarks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Fetch a bookmark only if `viewer` may see it
    #[instrument(skip(self, viewer), fields(bookmark_id = %abbrev_uuid(&id)), err)]
    pub async fn get_visible(&mut self, id: BookmarkId, viewer: Viewer) -> Result<Option<BookmarkDBResponse>> {
        let mut query = QueryBuilder::new(SELECT_BOOKMARKS);
        query.push(" WHERE b.id = ");
        query.push_bind(id);
        push_visibility(&mut query, "b", viewer, true);

        let bookmark = query.build_query_as::<BookmarkDBResponse>().fetch_optional(&mut *self.db).await?;
        Ok(bookmark)
    }

    /// Count bookmarks matching the filter (ignores skip/limit)
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &BookmarkFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM bookmarks b WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Hide a bookmark from everyone except its owner and moderators
    #[instrument(skip(self), fields(bookmark_id = %abbrev_uuid(&id)), err)]
    pub async fn hide(&mut self, id: BookmarkId) -> Result<bool> {
        let result = sqlx::query("UPDATE bookmarks SET is_hidden = true, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Owners of other public, visible bookmarks of the same URL
    #[instrument(skip(self, url), fields(exclude = %abbrev_uuid(&exclude_owner)), err)]
    pub async fn public_owners_of_url(&mut self, url: &str, exclude_owner: UserId) -> Result<Vec<UserId>> {
        let owners: Vec<UserId> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT b.owner_id FROM bookmarks b
            JOIN profiles p ON p.id = b.owner_id
            WHERE b.url = $1 AND b.owner_id <> $2
              AND b.is_public AND NOT b.is_hidden AND NOT p.is_suspended
            "#,
        )
        .bind(url)
        .bind(exclude_owner)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(owners)
    }

    /// The caller's most used tags, most frequent first
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn top_tags(&mut self, owner_id: UserId, limit: i64) -> Result<Vec<String>> {
        let tags: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT tag FROM bookmarks, unnest(tags) AS tag
            WHERE owner_id = $1
            GROUP BY tag
            ORDER BY COUNT(*) DESC, tag
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(tags)
    }

    /// Public bookmarks by other, non-suspended profiles created since `since`,
    /// excluding URLs the caller already saved. Newest first.
    #[instrument(skip(self), fields(caller = %abbrev_uuid(&caller)), err)]
    pub async fn feed_candidates(&mut self, caller: UserId, since: DateTime<Utc>, limit: i64) -> Result<Vec<FeedCandidate>> {
        let candidates = sqlx::query_as::<_, FeedCandidate>(
            r#"
            SELECT
                b.id, b.owner_id, p.username AS owner_username, b.url, b.title, b.description, b.tags, b.created_at,
                EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = $1 AND f.followee_id = b.owner_id) AS followed,
                (SELECT COUNT(*) FROM bookmarks o WHERE o.url = b.url AND o.is_public AND NOT o.is_hidden) AS popularity
            FROM bookmarks b
            JOIN profiles p ON p.id = b.owner_id
            WHERE b.is_public AND NOT b.is_hidden AND NOT p.is_suspended
              AND b.owner_id <> $1
              AND b.created_at >= $2
              AND NOT EXISTS (SELECT 1 FROM bookmarks mine WHERE mine.owner_id = $1 AND mine.url = b.url)
            ORDER BY b.created_at DESC, b.id
            LIMIT $3
            "#,
        )
        .bind(caller)
        .bind(since)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(candidates)
    }
}
