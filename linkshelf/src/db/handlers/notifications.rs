//! Database repository for in-app notifications.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::notifications::{NotificationCreateDBRequest, NotificationDBResponse},
};
use crate::types::{NotificationId, UserId, abbrev_uuid};

/// Postgres channel every inserted notification is published on
pub const NOTIFICATION_CHANNEL: &str = "linkshelf_notifications";

pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a notification and publish it with `pg_notify` in the same
    /// statement, so listeners only ever see committed rows.
    #[instrument(skip(self, request), fields(recipient = %abbrev_uuid(&request.recipient_id), kind = ?request.kind), err)]
    pub async fn create(&mut self, request: &NotificationCreateDBRequest) -> Result<NotificationDBResponse> {
        let notification = sqlx::query_as::<_, NotificationDBResponse>(
            r#"
            WITH inserted AS (
                INSERT INTO notifications (recipient_id, kind, actor_id, subject_id, message)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            ),
            published AS (
                SELECT pg_notify($6, row_to_json(inserted)::text) FROM inserted
            )
            SELECT inserted.* FROM inserted, published
            "#,
        )
        .bind(request.recipient_id)
        .bind(request.kind)
        .bind(request.actor_id)
        .bind(request.subject_id)
        .bind(&request.message)
        .bind(NOTIFICATION_CHANNEL)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(notification)
    }

    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn list(&mut self, recipient_id: UserId, unread_only: bool, skip: i64, limit: i64) -> Result<Vec<NotificationDBResponse>> {
        let notifications = sqlx::query_as::<_, NotificationDBResponse>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR read_at IS NULL)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(recipient_id)
        .bind(unread_only)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(notifications)
    }

    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn count(&mut self, recipient_id: UserId, unread_only: bool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND (NOT $2 OR read_at IS NULL)")
            .bind(recipient_id)
            .bind(unread_only)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Mark one of the recipient's notifications read. Returns false if it
    /// does not exist or belongs to someone else.
    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_read(&mut self, id: NotificationId, recipient_id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET read_at = COALESCE(read_at, NOW()) WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn mark_all_read(&mut self, recipient_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read_at = NOW() WHERE recipient_id = $1 AND read_at IS NULL")
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::notifications::NotificationKind;
    use crate::test_utils::create_test_profile;
    use sqlx::PgPool;
    use sqlx::postgres::PgListener;

    fn request(recipient_id: UserId, message: &str) -> NotificationCreateDBRequest {
        NotificationCreateDBRequest {
            recipient_id,
            kind: NotificationKind::System,
            actor_id: None,
            subject_id: None,
            message: message.to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unread_tracking(pool: PgPool) {
        let user = create_test_profile(&pool).await;
        let other = create_test_profile(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Notifications::new(&mut conn);

        let first = repo.create(&request(user.id, "one")).await.unwrap();
        repo.create(&request(user.id, "two")).await.unwrap();
        assert_eq!(repo.count(user.id, true).await.unwrap(), 2);

        assert!(!repo.mark_read(first.id, other.id).await.unwrap());
        assert!(repo.mark_read(first.id, user.id).await.unwrap());
        assert_eq!(repo.count(user.id, true).await.unwrap(), 1);
        assert_eq!(repo.list(user.id, true, 0, 10).await.unwrap()[0].message, "two");

        assert_eq!(repo.mark_all_read(user.id).await.unwrap(), 1);
        assert_eq!(repo.count(user.id, true).await.unwrap(), 0);
        assert_eq!(repo.count(user.id, false).await.unwrap(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_insert_publishes_row(pool: PgPool) {
        let user = create_test_profile(&pool).await;
        let mut listener = PgListener::connect_with(&pool).await.unwrap();
        listener.listen(NOTIFICATION_CHANNEL).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let created = Notifications::new(&mut conn).create(&request(user.id, "hello")).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), listener.recv())
            .await
            .unwrap()
            .unwrap();
        let payload: NotificationDBResponse = serde_json::from_str(received.payload()).unwrap();
        assert_eq!(payload.id, created.id);
        assert_eq!(payload.recipient_id, user.id);
        assert_eq!(payload.message, "hello");
    }
}
