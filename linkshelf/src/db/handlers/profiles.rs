//! Database repository for profiles and the follow graph.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::{repository::Repository, visibility::Viewer},
    models::profiles::{
        FollowDBResponse, OnboardingDBRequest, ProfileCreateDBRequest, ProfileDBResponse, ProfileFlagsUpdateDBRequest,
        ProfileStats, ProfileUpdateDBRequest,
    },
};
use crate::types::{UserId, abbrev_uuid};

/// Filter for listing profiles
#[derive(Debug, Clone)]
pub struct ProfileFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive substring over username, display name and email
    pub search: Option<String>,
}

impl ProfileFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.filter(|s| !s.trim().is_empty());
        self
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        if let Some(ref search) = self.search {
            let pattern = format!("%{}%", search.trim().to_lowercase());
            query.push(" AND (LOWER(username) LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR LOWER(COALESCE(display_name, '')) LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR LOWER(email) LIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
    }
}

pub struct Profiles<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Profiles<'c> {
    type CreateRequest = ProfileCreateDBRequest;
    type UpdateRequest = ProfileUpdateDBRequest;
    type Response = ProfileDBResponse;
    type Id = UserId;
    type Filter = ProfileFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            INSERT INTO profiles (username, email, display_name, password_hash, auth_source, is_admin, is_moderator)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(&request.password_hash)
        .bind(&request.auth_source)
        .bind(request.is_admin)
        .bind(request.is_moderator)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(profile)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM profiles WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let profiles = query.build_query_as::<ProfileDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(profiles)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            UPDATE profiles SET
                display_name = COALESCE($2, display_name),
                bio = COALESCE($3, bio),
                avatar_url = COALESCE($4, avatar_url),
                website_url = COALESCE($5, website_url),
                password_hash = COALESCE($6, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.display_name)
        .bind(&request.bio)
        .bind(&request.avatar_url)
        .bind(&request.website_url)
        .bind(&request.password_hash)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(profile)
    }
}

impl<'c> Profiles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count profiles matching the filter (ignores skip/limit)
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ProfileFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM profiles WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM profiles WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_username(&mut self, username: &str) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM profiles WHERE username = LOWER($1)")
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self), err)]
    pub async fn username_taken(&mut self, username: &str) -> Result<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE username = $1)")
            .bind(username)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(taken)
    }

    /// Complete onboarding. Returns `None` if the profile was already onboarded.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id), username = %request.username), err)]
    pub async fn complete_onboarding(&mut self, id: UserId, request: &OnboardingDBRequest) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            UPDATE profiles SET
                username = $2,
                display_name = COALESCE($3, display_name),
                bio = COALESCE($4, bio),
                avatar_url = COALESCE($5, avatar_url),
                onboarded_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND onboarded_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.username)
        .bind(&request.display_name)
        .bind(&request.bio)
        .bind(&request.avatar_url)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(profile)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn touch_last_login(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE profiles SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_flags(&mut self, id: UserId, request: &ProfileFlagsUpdateDBRequest) -> Result<ProfileDBResponse> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            UPDATE profiles SET
                is_admin = COALESCE($2, is_admin),
                is_moderator = COALESCE($3, is_moderator),
                is_suspended = COALESCE($4, is_suspended),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.is_admin)
        .bind(request.is_moderator)
        .bind(request.is_suspended)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(profile)
    }

    /// Counts shown on a profile page. Bookmark and collection counts only
    /// include rows the viewer can see.
    #[instrument(skip(self, viewer), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn stats(&mut self, id: UserId, viewer: Viewer) -> Result<ProfileStats> {
        let stats = sqlx::query_as::<_, ProfileStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM bookmarks b
                    WHERE b.owner_id = $1
                      AND (b.owner_id = $2 OR (b.is_public AND NOT b.is_hidden) OR $3)) AS bookmark_count,
                (SELECT COUNT(*) FROM collections c
                    WHERE c.owner_id = $1
                      AND (c.owner_id = $2 OR c.is_public OR $3)) AS collection_count,
                (SELECT COUNT(*) FROM follows WHERE followee_id = $1) AS follower_count,
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following_count,
                EXISTS (SELECT 1 FROM follows WHERE follower_id = $2 AND followee_id = $1) AS is_followed_by_me
            "#,
        )
        .bind(id)
        .bind(viewer.id)
        .bind(viewer.privileged)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(stats)
    }

    /// Follow a profile. Returns true if a new edge was created.
    #[instrument(skip(self), fields(follower = %abbrev_uuid(&follower_id), followee = %abbrev_uuid(&followee_id)), err)]
    pub async fn follow(&mut self, follower_id: UserId, followee_id: UserId) -> Result<bool> {
        let result = sqlx::query("INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unfollow a profile. Returns true if an edge was removed.
    #[instrument(skip(self), fields(follower = %abbrev_uuid(&follower_id), followee = %abbrev_uuid(&followee_id)), err)]
    pub async fn unfollow(&mut self, follower_id: UserId, followee_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Profiles following `id`, newest first. Suspended profiles are omitted.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn followers(&mut self, id: UserId, skip: i64, limit: i64) -> Result<Vec<FollowDBResponse>> {
        let rows = sqlx::query_as::<_, FollowDBResponse>(
            r#"
            SELECT p.id, p.username, p.display_name, p.avatar_url, f.created_at AS followed_at
            FROM follows f
            JOIN profiles p ON p.id = f.follower_id
            WHERE f.followee_id = $1 AND NOT p.is_suspended
            ORDER BY f.created_at DESC, p.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    /// Profiles `id` follows, newest first. Suspended profiles are omitted.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn following(&mut self, id: UserId, skip: i64, limit: i64) -> Result<Vec<FollowDBResponse>> {
        let rows = sqlx::query_as::<_, FollowDBResponse>(
            r#"
            SELECT p.id, p.username, p.display_name, p.avatar_url, f.created_at AS followed_at
            FROM follows f
            JOIN profiles p ON p.id = f.followee_id
            WHERE f.follower_id = $1 AND NOT p.is_suspended
            ORDER BY f.created_at DESC, p.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn count_followers(&mut self, id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows f JOIN profiles p ON p.id = f.follower_id WHERE f.followee_id = $1 AND NOT p.is_suspended",
        )
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn count_following(&mut self, id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows f JOIN profiles p ON p.id = f.followee_id WHERE f.follower_id = $1 AND NOT p.is_suspended",
        )
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_bookmark, create_test_profile};
    use sqlx::PgPool;

    fn create_request(username: &str) -> ProfileCreateDBRequest {
        ProfileCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            display_name: Some("Test Profile".to_string()),
            password_hash: None,
            auth_source: "native".to_string(),
            is_admin: false,
            is_moderator: false,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_lookup_profile(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        let profile = repo.create(&create_request("alice")).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert!(!profile.is_admin);
        assert!(profile.onboarded_at.is_none());

        let by_email = repo.get_by_email("ALICE@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, profile.id);

        let by_username = repo.get_by_username("Alice").await.unwrap().unwrap();
        assert_eq!(by_username.id, profile.id);

        assert!(repo.username_taken("alice").await.unwrap());
        assert!(!repo.username_taken("bob").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        repo.create(&create_request("alice")).await.unwrap();
        let mut dup = create_request("alice2");
        dup.email = "Alice@Example.com".to_string();

        let err = repo.create(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_username_rejected_by_check(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        let err = repo.create(&create_request("Not Valid!")).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_onboarding_only_once(pool: PgPool) {
        let profile = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        let request = OnboardingDBRequest {
            username: "onboarded_user".to_string(),
            display_name: Some("Onboarded".to_string()),
            bio: Some("hello".to_string()),
            avatar_url: None,
        };

        let updated = repo.complete_onboarding(profile.id, &request).await.unwrap().unwrap();
        assert_eq!(updated.username, "onboarded_user");
        assert_eq!(updated.bio.as_deref(), Some("hello"));
        assert!(updated.onboarded_at.is_some());

        let again = repo.complete_onboarding(profile.id, &request).await.unwrap();
        assert!(again.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_follow_graph(pool: PgPool) {
        let alice = create_test_profile(&pool).await;
        let bob = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        assert!(repo.follow(alice.id, bob.id).await.unwrap());
        // idempotent
        assert!(!repo.follow(alice.id, bob.id).await.unwrap());

        let followers = repo.followers(bob.id, 0, 10).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, alice.id);
        assert_eq!(repo.count_following(alice.id).await.unwrap(), 1);

        let stats = repo.stats(bob.id, Viewer::profile(alice.id, false)).await.unwrap();
        assert_eq!(stats.follower_count, 1);
        assert_eq!(stats.following_count, 0);
        assert!(stats.is_followed_by_me);

        assert!(repo.unfollow(alice.id, bob.id).await.unwrap());
        assert!(!repo.unfollow(alice.id, bob.id).await.unwrap());
        assert_eq!(repo.count_followers(bob.id).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_self_follow_rejected(pool: PgPool) {
        let alice = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        let err = repo.follow(alice.id, alice.id).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stats_respect_visibility(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        create_test_bookmark(&pool, owner.id, "https://example.com/public", &[], true).await;
        create_test_bookmark(&pool, owner.id, "https://example.com/private", &[], false).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);

        assert_eq!(repo.stats(owner.id, Viewer::profile(owner.id, false)).await.unwrap().bookmark_count, 2);
        assert_eq!(repo.stats(owner.id, Viewer::profile(other.id, false)).await.unwrap().bookmark_count, 1);
        assert_eq!(repo.stats(owner.id, Viewer::anonymous()).await.unwrap().bookmark_count, 1);
        assert_eq!(repo.stats(owner.id, Viewer::profile(other.id, true)).await.unwrap().bookmark_count, 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_with_search_and_flags(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Profiles::new(&mut conn);
        let carol = repo.create(&create_request("carol")).await.unwrap();
        repo.create(&create_request("dave")).await.unwrap();

        let filter = ProfileFilter::new(0, 10).with_search(Some("CAR".to_string()));
        let found = repo.list(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, carol.id);
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        assert_eq!(repo.count(&ProfileFilter::new(0, 10)).await.unwrap(), 2);

        let updated = repo
            .update_flags(
                carol.id,
                &ProfileFlagsUpdateDBRequest {
                    is_moderator: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_moderator);
        assert!(!updated.is_admin);
        assert!(updated.is_privileged());
    }
}
