//! Database repository for API keys.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::api_keys::{ApiKeyCreateDBRequest, ApiKeyDBResponse},
};
use crate::types::{ApiKeyId, UserId, abbrev_uuid};

pub struct ApiKeys<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ApiKeys<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), name = %request.name), err)]
    pub async fn create(&mut self, request: &ApiKeyCreateDBRequest) -> Result<ApiKeyDBResponse> {
        let key = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            INSERT INTO api_keys (user_id, name, key_prefix, key_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, name, key_prefix, last_used_at, created_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.key_prefix)
        .bind(&request.key_hash)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(key)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_by_user(&mut self, user_id: UserId) -> Result<Vec<ApiKeyDBResponse>> {
        let keys = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            SELECT id, user_id, name, key_prefix, last_used_at, created_at
            FROM api_keys WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(keys)
    }

    /// Delete a key belonging to `user_id`. Returns false if no such key.
    #[instrument(skip(self), fields(key_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn delete_for_user(&mut self, id: ApiKeyId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Look up a key by its hash and stamp `last_used_at`.
    #[instrument(skip(self, key_hash), err)]
    pub async fn authenticate(&mut self, key_hash: &str) -> Result<Option<ApiKeyDBResponse>> {
        let key = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            UPDATE api_keys SET last_used_at = NOW()
            WHERE key_hash = $1
            RETURNING id, user_id, name, key_prefix, last_used_at, created_at
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_profile;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_key_lifecycle(pool: PgPool) {
        let user = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ApiKeys::new(&mut conn);

        let hash = "a".repeat(64);
        let key = repo
            .create(&ApiKeyCreateDBRequest {
                user_id: user.id,
                name: "ci".to_string(),
                key_prefix: "ls_abcdefgh".to_string(),
                key_hash: hash.clone(),
            })
            .await
            .unwrap();
        assert!(key.last_used_at.is_none());

        let used = repo.authenticate(&hash).await.unwrap().unwrap();
        assert_eq!(used.id, key.id);
        assert!(used.last_used_at.is_some());
        assert!(repo.authenticate(&"b".repeat(64)).await.unwrap().is_none());

        assert!(!repo.delete_for_user(key.id, other.id).await.unwrap());
        assert_eq!(repo.list_by_user(user.id).await.unwrap().len(), 1);
        assert!(repo.delete_for_user(key.id, user.id).await.unwrap());
        assert!(repo.list_by_user(user.id).await.unwrap().is_empty());
    }
}
