//! Database repository for password reset tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest},
    },
    types::{UserId, abbrev_uuid},
};

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        let token_hash = password::hash_string_with_params(&request.raw_token, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, created_at, used_at
            "#,
        )
        .bind(request.user_id)
        .bind(token_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: Uuid) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, user_id, token_hash, expires_at, created_at, used_at FROM password_reset_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Create a password reset token for a user. Returns the raw token (sent
    /// by email, never stored) alongside the stored record.
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, config: &Config) -> Result<(String, PasswordResetToken)> {
        let raw_token = password::generate_reset_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.password_reset_token_duration).unwrap_or(chrono::Duration::minutes(30));

        let request = PasswordResetTokenCreateRequest {
            user_id,
            raw_token: raw_token.clone(),
            expires_at,
            argon2_params: password::Argon2Params::from(&config.auth.native.password),
        };

        let token = self.create(&request).await?;
        Ok((raw_token, token))
    }

    /// Find an unused, unexpired token by ID whose hash matches `raw_token`.
    #[instrument(skip(self, raw_token), fields(token_id = %abbrev_uuid(&token_id)), err)]
    pub async fn find_valid_token_by_id(&mut self, token_id: Uuid, raw_token: &str) -> Result<Option<PasswordResetToken>> {
        let Some(token) = self.get_by_id(token_id).await? else {
            return Ok(None);
        };

        if token.used_at.is_some() || Utc::now() > token.expires_at {
            return Ok(None);
        }

        match password::verify_string(raw_token, &token.token_hash) {
            Ok(true) => Ok(Some(token)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::error!("Token verification error for token {}: {:?}", token_id, e);
                Ok(None)
            }
        }
    }

    /// Invalidate all outstanding tokens for a user
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_profile};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_token_lifecycle(pool: PgPool) {
        let user = create_test_profile(&pool).await;
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = PasswordResetTokens::new(&mut conn);

        let (raw, token) = repo.create_for_user(user.id, &config).await.unwrap();
        assert_ne!(token.token_hash, raw);

        assert!(repo.find_valid_token_by_id(token.id, "wrong").await.unwrap().is_none());
        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_some());

        assert_eq!(repo.invalidate_for_user(user.id).await.unwrap(), 1);
        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_none());
    }
}
