//! Database repository for webhook configuration and delivery tracking.

use chrono::{Duration, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::models::webhooks::{
    ClaimedDelivery, DeliveryId, DeliveryStatus, Webhook, WebhookCreateDBRequest, WebhookDelivery, WebhookDeliveryCreateDBRequest,
    WebhookId, WebhookUpdateDBRequest,
};
use crate::types::{UserId, abbrev_uuid};

/// How far a claim pushes `next_attempt_at` forward. If the instance dies
/// mid-send the delivery becomes claimable again after this long.
const CLAIM_LEASE_MINUTES: i64 = 5;

/// Repository for webhook operations.
pub struct Webhooks<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Webhooks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create a new webhook for a user.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &WebhookCreateDBRequest) -> Result<Webhook> {
        let event_types_json = request.event_types.as_ref().map(|types| serde_json::json!(types));

        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO user_webhooks (user_id, url, secret, event_types, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.url)
        .bind(&request.secret)
        .bind(event_types_json)
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(webhook)
    }

    /// Get a webhook by ID.
    #[instrument(skip(self), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: WebhookId) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>("SELECT * FROM user_webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(webhook)
    }

    /// List webhooks for a user.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_by_user(&mut self, user_id: UserId) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM user_webhooks
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(webhooks)
    }

    /// Update a webhook.
    #[instrument(skip(self, request), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: WebhookId, request: &WebhookUpdateDBRequest) -> Result<Option<Webhook>> {
        // Option<Option<Vec>> -> (touch column?, new value)
        let event_types_json: Option<Option<serde_json::Value>> = request
            .event_types
            .as_ref()
            .map(|opt| opt.as_ref().map(|types| serde_json::json!(types)));

        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            UPDATE user_webhooks
            SET
                url = COALESCE($2, url),
                enabled = COALESCE($3, enabled),
                event_types = CASE
                    WHEN $4::boolean THEN $5
                    ELSE event_types
                END,
                description = CASE
                    WHEN $6::boolean THEN $7
                    ELSE description
                END,
                -- Re-enabling clears the circuit breaker
                disabled_at = CASE
                    WHEN $3 = true THEN NULL
                    ELSE disabled_at
                END,
                consecutive_failures = CASE
                    WHEN $3 = true THEN 0
                    ELSE consecutive_failures
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.url)
        .bind(request.enabled)
        .bind(event_types_json.is_some())
        .bind(event_types_json.flatten())
        .bind(request.description.is_some())
        .bind(request.description.clone().flatten())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(webhook)
    }

    /// Delete a webhook.
    #[instrument(skip(self), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: WebhookId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_webhooks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Rotate a webhook's secret.
    #[instrument(skip(self, new_secret), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn rotate_secret(&mut self, id: WebhookId, new_secret: &str) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            UPDATE user_webhooks
            SET secret = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_secret)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(webhook)
    }

    /// Get enabled webhooks for a user that accept a specific event type.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_enabled_webhooks_for_event(&mut self, user_id: UserId, event_type: &str) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM user_webhooks
            WHERE user_id = $1
              AND enabled = true
              AND disabled_at IS NULL
              AND (
                  event_types IS NULL
                  OR event_types @> $2::jsonb
              )
            "#,
        )
        .bind(user_id)
        .bind(serde_json::json!([event_type]))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(webhooks)
    }

    /// Increment consecutive failures. Returns the webhook if this failure
    /// tripped the circuit breaker and disabled it.
    #[instrument(skip(self), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn increment_failures(&mut self, id: WebhookId, threshold: i32) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            UPDATE user_webhooks
            SET
                consecutive_failures = consecutive_failures + 1,
                enabled = CASE
                    WHEN consecutive_failures + 1 >= $2 THEN false
                    ELSE enabled
                END,
                disabled_at = CASE
                    WHEN consecutive_failures + 1 >= $2 AND disabled_at IS NULL THEN now()
                    ELSE disabled_at
                END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(threshold)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(webhook.filter(|w| w.consecutive_failures == threshold))
    }

    /// Reset consecutive failures on successful delivery.
    #[instrument(skip(self), fields(webhook_id = %abbrev_uuid(&id)), err)]
    pub async fn reset_failures(&mut self, id: WebhookId) -> Result<()> {
        sqlx::query("UPDATE user_webhooks SET consecutive_failures = 0 WHERE id = $1 AND consecutive_failures > 0")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    // ===== Delivery methods =====

    /// Create a new delivery record.
    #[instrument(skip(self, request), fields(webhook_id = %abbrev_uuid(&request.webhook_id)), err)]
    pub async fn create_delivery(&mut self, request: &WebhookDeliveryCreateDBRequest) -> Result<WebhookDelivery> {
        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (webhook_id, event_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.webhook_id)
        .bind(request.event_id)
        .bind(&request.event_type)
        .bind(&request.payload)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(delivery)
    }

    /// Claim deliveries that are due, joined with their webhook's target.
    ///
    /// Rows are locked with `FOR UPDATE SKIP LOCKED` so concurrent claimers
    /// never receive the same delivery, and `next_attempt_at` is pushed
    /// forward so a crashed claimer's rows come back after the lease.
    #[instrument(skip(self), err)]
    pub async fn claim_due_deliveries(&mut self, limit: i64) -> Result<Vec<ClaimedDelivery>> {
        let claimed = sqlx::query_as::<_, ClaimedDelivery>(
            r#"
            WITH due AS (
                SELECT id FROM webhook_deliveries
                WHERE status IN ('pending', 'failed')
                  AND next_attempt_at <= now()
                ORDER BY next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ),
            claimed AS (
                UPDATE webhook_deliveries d
                SET next_attempt_at = now() + make_interval(mins => $2::int), updated_at = now()
                FROM due
                WHERE d.id = due.id
                RETURNING d.id, d.webhook_id, d.event_id, d.payload, d.attempt_count
            )
            SELECT c.id, c.webhook_id, c.event_id, c.payload, c.attempt_count, w.url, w.secret, w.enabled
            FROM claimed c
            LEFT JOIN user_webhooks w ON w.id = c.webhook_id
            "#,
        )
        .bind(limit)
        .bind(CLAIM_LEASE_MINUTES as i32)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(claimed)
    }

    /// Mark a delivery as successful.
    #[instrument(skip(self), fields(delivery_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_delivered(&mut self, id: DeliveryId, status_code: i32) -> Result<WebhookDelivery> {
        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            UPDATE webhook_deliveries
            SET
                status = 'delivered',
                attempt_count = attempt_count + 1,
                last_status_code = $2,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_code)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(delivery)
    }

    /// Mark a delivery as failed and schedule its next attempt from
    /// `retry_schedule_secs`, or mark it exhausted when the schedule runs out.
    #[instrument(skip(self, error, retry_schedule_secs), fields(delivery_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_failed(
        &mut self,
        id: DeliveryId,
        status_code: Option<i32>,
        error: &str,
        current_attempt: i32,
        retry_schedule_secs: &[i64],
    ) -> Result<WebhookDelivery> {
        let new_attempt = current_attempt + 1;
        let (new_status, next_attempt_at) = next_attempt(new_attempt, retry_schedule_secs);

        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            UPDATE webhook_deliveries
            SET
                status = $2,
                attempt_count = $3,
                next_attempt_at = $4,
                last_status_code = $5,
                last_error = $6,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_status.as_str())
        .bind(new_attempt)
        .bind(next_attempt_at)
        .bind(status_code)
        .bind(error)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(delivery)
    }

    /// Give up on a delivery without another attempt (its webhook is gone or disabled).
    #[instrument(skip(self, reason), fields(delivery_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_exhausted(&mut self, id: DeliveryId, reason: &str) -> Result<()> {
        sqlx::query("UPDATE webhook_deliveries SET status = 'exhausted', last_error = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(reason)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Get a delivery by ID.
    #[instrument(skip(self), fields(delivery_id = %abbrev_uuid(&id)), err)]
    pub async fn get_delivery_by_id(&mut self, id: DeliveryId) -> Result<Option<WebhookDelivery>> {
        let delivery = sqlx::query_as::<_, WebhookDelivery>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(delivery)
    }
}

/// Status and due time after attempt number `attempt` failed.
/// `retry_schedule_secs[n]` is the delay before attempt `n + 1`.
fn next_attempt(attempt: i32, retry_schedule_secs: &[i64]) -> (DeliveryStatus, chrono::DateTime<Utc>) {
    match retry_schedule_secs.get(attempt as usize) {
        Some(delay) => (DeliveryStatus::Failed, Utc::now() + Duration::seconds(*delay)),
        None => (DeliveryStatus::Exhausted, Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_profile;
    use sqlx::PgPool;

    const SCHEDULE: &[i64] = &[0, 5, 300];

    #[test]
    fn test_next_attempt_schedule() {
        let (status, at) = next_attempt(1, SCHEDULE);
        assert_eq!(status, DeliveryStatus::Failed);
        assert!(at > Utc::now() + Duration::seconds(3));

        let (status, _) = next_attempt(2, SCHEDULE);
        assert_eq!(status, DeliveryStatus::Failed);

        let (status, _) = next_attempt(3, SCHEDULE);
        assert_eq!(status, DeliveryStatus::Exhausted);
    }

    async fn webhook_for(pool: &PgPool, event_types: Option<Vec<String>>) -> Webhook {
        let user = create_test_profile(pool).await;
        let mut conn = pool.acquire().await.unwrap();
        Webhooks::new(&mut conn)
            .create(&WebhookCreateDBRequest {
                user_id: user.id,
                url: "https://example.com/hook".to_string(),
                secret: "whsec_test".to_string(),
                event_types,
                description: None,
            })
            .await
            .unwrap()
    }

    fn delivery_request(webhook_id: WebhookId) -> WebhookDeliveryCreateDBRequest {
        WebhookDeliveryCreateDBRequest {
            webhook_id,
            event_id: uuid::Uuid::new_v4(),
            event_type: "bookmark.created".to_string(),
            payload: serde_json::json!({"type": "bookmark.created"}),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_event_filter_query(pool: PgPool) {
        let filtered = webhook_for(&pool, Some(vec!["bookmark.deleted".to_string()])).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Webhooks::new(&mut conn);

        assert!(
            repo.get_enabled_webhooks_for_event(filtered.user_id, "bookmark.created")
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            repo.get_enabled_webhooks_for_event(filtered.user_id, "bookmark.deleted")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_claim_is_exclusive_until_lease_expires(pool: PgPool) {
        let webhook = webhook_for(&pool, None).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Webhooks::new(&mut conn);
        repo.create_delivery(&delivery_request(webhook.id)).await.unwrap();

        let claimed = repo.claim_due_deliveries(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].url.as_deref(), Some("https://example.com/hook"));
        assert_eq!(claimed[0].attempt_count, 0);

        // Lease pushed next_attempt_at into the future
        assert!(repo.claim_due_deliveries(10).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failure_then_exhaustion(pool: PgPool) {
        let webhook = webhook_for(&pool, None).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Webhooks::new(&mut conn);
        let delivery = repo.create_delivery(&delivery_request(webhook.id)).await.unwrap();

        let failed = repo.mark_failed(delivery.id, Some(500), "boom", 0, SCHEDULE).await.unwrap();
        assert_eq!(failed.delivery_status(), DeliveryStatus::Failed);
        assert_eq!(failed.attempt_count, 1);

        let exhausted = repo.mark_failed(delivery.id, None, "timeout", 2, SCHEDULE).await.unwrap();
        assert_eq!(exhausted.delivery_status(), DeliveryStatus::Exhausted);
        assert_eq!(exhausted.attempt_count, 3);

        let delivered = repo.mark_delivered(delivery.id, 200).await.unwrap();
        assert_eq!(delivered.delivery_status(), DeliveryStatus::Delivered);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_circuit_breaker_trips_once(pool: PgPool) {
        let webhook = webhook_for(&pool, None).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Webhooks::new(&mut conn);

        assert!(repo.increment_failures(webhook.id, 2).await.unwrap().is_none());
        let tripped = repo.increment_failures(webhook.id, 2).await.unwrap().unwrap();
        assert!(!tripped.enabled);
        assert!(tripped.disabled_at.is_some());
        assert!(repo.increment_failures(webhook.id, 2).await.unwrap().is_none());

        let reenabled = repo
            .update(
                webhook.id,
                &WebhookUpdateDBRequest {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(reenabled.enabled);
        assert_eq!(reenabled.consecutive_failures, 0);
        assert!(reenabled.disabled_at.is_none());
    }
}
