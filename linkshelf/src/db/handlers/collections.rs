//! Database repository for collections and their ordered items.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        repository::Repository,
        visibility::{Viewer, push_visibility},
    },
    models::{
        bookmarks::BookmarkDBResponse,
        collections::{CollectionCreateDBRequest, CollectionDBResponse, CollectionUpdateDBRequest},
    },
};
use crate::types::{BookmarkId, CollectionId, UserId, abbrev_uuid};

const SELECT_COLLECTIONS: &str = r#"
    SELECT c.*, p.username AS owner_username,
        (SELECT COUNT(*) FROM collection_items ci WHERE ci.collection_id = c.id) AS bookmark_count
    FROM collections c JOIN profiles p ON p.id = c.owner_id"#;

#[derive(Debug, Clone)]
pub struct CollectionFilter {
    pub skip: i64,
    pub limit: i64,
    pub viewer: Viewer,
    pub owner_id: Option<UserId>,
}

impl CollectionFilter {
    pub fn new(viewer: Viewer, skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            viewer,
            owner_id: None,
        }
    }

    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        push_visibility(query, "c", self.viewer, false);
        if let Some(owner_id) = self.owner_id {
            query.push(" AND c.owner_id = ");
            query.push_bind(owner_id);
        }
    }
}

pub struct Collections<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Collections<'c> {
    type CreateRequest = CollectionCreateDBRequest;
    type UpdateRequest = CollectionUpdateDBRequest;
    type Response = CollectionDBResponse;
    type Id = CollectionId;
    type Filter = CollectionFilter;

    #[instrument(skip(self, request), fields(owner_id = %abbrev_uuid(&request.owner_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let collection = sqlx::query_as::<_, CollectionDBResponse>(
            r#"
            WITH inserted AS (
                INSERT INTO collections (owner_id, name, description, is_public)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT c.*, p.username AS owner_username, 0::BIGINT AS bookmark_count
            FROM inserted c JOIN profiles p ON p.id = c.owner_id
            "#,
        )
        .bind(request.owner_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.is_public)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(collection)
    }

    #[instrument(skip(self), fields(collection_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let collection = sqlx::query_as::<_, CollectionDBResponse>(&format!("{SELECT_COLLECTIONS} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(collection)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(SELECT_COLLECTIONS);
        query.push(" WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY c.created_at DESC, c.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let collections = query.build_query_as::<CollectionDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(collections)
    }

    #[instrument(skip(self), fields(collection_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(collection_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let collection = sqlx::query_as::<_, CollectionDBResponse>(
            r#"
            WITH updated AS (
                UPDATE collections SET
                    name = COALESCE($2, name),
                    description = COALESCE($3, description),
                    is_public = COALESCE($4, is_public),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT c.*, p.username AS owner_username,
                (SELECT COUNT(*) FROM collection_items ci WHERE ci.collection_id = c.id) AS bookmark_count
            FROM updated c JOIN profiles p ON p.id = c.owner_id
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.is_public)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(collection)
    }
}

impl<'c> Collections<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Fetch a collection only if `viewer` may see it
    #[instrument(skip(self, viewer), fields(collection_id = %abbrev_uuid(&id)), err)]
    pub async fn get_visible(&mut self, id: CollectionId, viewer: Viewer) -> Result<Option<CollectionDBResponse>> {
        let mut query = QueryBuilder::new(SELECT_COLLECTIONS);
        query.push(" WHERE c.id = ");
        query.push_bind(id);
        push_visibility(&mut query, "c", viewer, false);

        let collection = query.build_query_as::<CollectionDBResponse>().fetch_optional(&mut *self.db).await?;
        Ok(collection)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &CollectionFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM collections c WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    /// Used by moderation to take a collection out of public view
    #[instrument(skip(self), fields(collection_id = %abbrev_uuid(&id)), err)]
    pub async fn make_private(&mut self, id: CollectionId) -> Result<bool> {
        let result = sqlx::query("UPDATE collections SET is_public = false, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a bookmark at the end of a collection
    #[instrument(skip(self), fields(collection_id = %abbrev_uuid(&collection_id), bookmark_id = %abbrev_uuid(&bookmark_id)), err)]
    pub async fn add_item(&mut self, collection_id: CollectionId, bookmark_id: BookmarkId) -> Result<i32> {
        let position: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO collection_items (collection_id, bookmark_id, position)
            SELECT $1, $2, COALESCE(MAX(position), 0) + 1
            FROM collection_items WHERE collection_id = $1
            RETURNING position
            "#,
        )
        .bind(collection_id)
        .bind(bookmark_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(position)
    }

    #[instrument(skip(self), fields(collection_id = %abbrev_uuid(&collection_id), bookmark_id = %abbrev_uuid(&bookmark_id)), err)]
    pub async fn remove_item(&mut self, collection_id: CollectionId, bookmark_id: BookmarkId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM collection_items WHERE collection_id = $1 AND bookmark_id = $2")
            .bind(collection_id)
            .bind(bookmark_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bookmarks in a collection that `viewer` can see, in position order
    #[instrument(skip(self, viewer), fields(collection_id = %abbrev_uuid(&collection_id)), err)]
    pub async fn items(&mut self, collection_id: CollectionId, viewer: Viewer, skip: i64, limit: i64) -> Result<Vec<BookmarkDBResponse>> {
        let mut query = QueryBuilder::new(
            r#"
            SELECT b.*, p.username AS owner_username
            FROM collection_items ci
            JOIN bookmarks b ON b.id = ci.bookmark_id
            JOIN profiles p ON p.id = b.owner_id
            WHERE ci.collection_id = "#,
        );
        query.push_bind(collection_id);
        push_visibility(&mut query, "b", viewer, true);
        query.push(" ORDER BY ci.position, ci.added_at LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(skip);

        let bookmarks = query.build_query_as::<BookmarkDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(bookmarks)
    }

    #[instrument(skip(self, viewer), fields(collection_id = %abbrev_uuid(&collection_id)), err)]
    pub async fn count_items(&mut self, collection_id: CollectionId, viewer: Viewer) -> Result<i64> {
        let mut query = QueryBuilder::new(
            "SELECT COUNT(*) FROM collection_items ci JOIN bookmarks b ON b.id = ci.bookmark_id WHERE ci.collection_id = ",
        );
        query.push_bind(collection_id);
        push_visibility(&mut query, "b", viewer, true);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_bookmark, create_test_collection, create_test_profile};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_items_are_ordered_and_filtered(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let stranger = create_test_profile(&pool).await;
        let collection = create_test_collection(&pool, owner.id, "reading", true).await;
        let first = create_test_bookmark(&pool, owner.id, "https://a.example", &[], true).await;
        let second = create_test_bookmark(&pool, owner.id, "https://b.example", &[], false).await;
        let third = create_test_bookmark(&pool, owner.id, "https://c.example", &[], true).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Collections::new(&mut conn);
        assert_eq!(repo.add_item(collection.id, first.id).await.unwrap(), 1);
        assert_eq!(repo.add_item(collection.id, second.id).await.unwrap(), 2);
        assert_eq!(repo.add_item(collection.id, third.id).await.unwrap(), 3);

        let duplicate = repo.add_item(collection.id, first.id).await.unwrap_err();
        assert!(matches!(duplicate, DbError::UniqueViolation { .. }));

        let owner_view = repo.items(collection.id, Viewer::profile(owner.id, false), 0, 10).await.unwrap();
        let ids: Vec<_> = owner_view.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);

        let stranger_view = repo.items(collection.id, Viewer::profile(stranger.id, false), 0, 10).await.unwrap();
        let ids: Vec<_> = stranger_view.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
        assert_eq!(repo.count_items(collection.id, Viewer::anonymous()).await.unwrap(), 2);

        assert!(repo.remove_item(collection.id, first.id).await.unwrap());
        assert!(!repo.remove_item(collection.id, first.id).await.unwrap());
        // Appending after a removal still goes to the end
        assert_eq!(repo.add_item(collection.id, first.id).await.unwrap(), 4);

        let fetched = repo.get_by_id(collection.id).await.unwrap().unwrap();
        assert_eq!(fetched.bookmark_count, 3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_private_collections_hidden_from_others(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let stranger = create_test_profile(&pool).await;
        let public = create_test_collection(&pool, owner.id, "public", true).await;
        create_test_collection(&pool, owner.id, "private", false).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Collections::new(&mut conn);

        let filter = CollectionFilter::new(Viewer::profile(stranger.id, false), 0, 10).owned_by(owner.id);
        let seen = repo.list(&filter).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, public.id);
        assert_eq!(repo.count(&filter).await.unwrap(), 1);

        assert!(repo.make_private(public.id).await.unwrap());
        assert!(repo.get_visible(public.id, Viewer::anonymous()).await.unwrap().is_none());
        assert!(repo.get_visible(public.id, Viewer::profile(owner.id, false)).await.unwrap().is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_name_conflicts(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        create_test_collection(&pool, owner.id, "reading", true).await;

        let mut conn = pool.acquire().await.unwrap();
        let err = Collections::new(&mut conn)
            .create(&CollectionCreateDBRequest {
                owner_id: owner.id,
                name: "reading".to_string(),
                description: None,
                is_public: false,
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("collections_owner_name_key"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_and_delete_report_missing_rows(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let collection = create_test_collection(&pool, owner.id, "reading", true).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Collections::new(&mut conn);

        assert!(repo.delete(collection.id).await.unwrap());
        assert!(!repo.delete(collection.id).await.unwrap());
        assert!(repo.get_by_id(collection.id).await.unwrap().is_none());

        let update = CollectionUpdateDBRequest {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        assert!(matches!(repo.update(collection.id, &update).await, Err(DbError::NotFound)));
    }
}
