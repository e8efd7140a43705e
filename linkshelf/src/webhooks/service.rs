//! Enqueueing webhook events.
//!
//! Events are written as `pending` delivery rows, one per subscribed webhook;
//! the dispatcher picks them up on its next tick. Enqueueing is best effort:
//! a failure is logged and never fails the request that produced the event.

use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::db::handlers::Webhooks;
use crate::db::models::webhooks::WebhookDeliveryCreateDBRequest;
use crate::types::{UserId, abbrev_uuid};
use crate::webhooks::events::WebhookEvent;

/// Insert one delivery per enabled webhook of `user_id` accepting the event.
/// Returns the number of deliveries created.
#[instrument(skip(conn, event), fields(user_id = %abbrev_uuid(&user_id), event_type = %event.event_type), err)]
pub async fn enqueue(conn: &mut PgConnection, user_id: UserId, event: &WebhookEvent) -> anyhow::Result<usize> {
    let mut repo = Webhooks::new(conn);
    let webhooks = repo.get_enabled_webhooks_for_event(user_id, event.event_type.as_str()).await?;
    if webhooks.is_empty() {
        return Ok(0);
    }

    let payload = serde_json::to_value(event)?;
    let mut created = 0;
    for webhook in webhooks.iter().filter(|w| w.accepts_event(event.event_type)) {
        repo.create_delivery(&WebhookDeliveryCreateDBRequest {
            webhook_id: webhook.id,
            event_id: Uuid::new_v4(),
            event_type: event.event_type.to_string(),
            payload: payload.clone(),
        })
        .await?;
        created += 1;
    }

    debug!(count = created, "Enqueued webhook deliveries");
    Ok(created)
}

/// Fire-and-forget wrapper used by request handlers.
pub async fn emit(pool: &PgPool, enabled: bool, user_id: UserId, event: WebhookEvent) {
    if !enabled {
        return;
    }
    let result = match pool.acquire().await {
        Ok(mut conn) => enqueue(&mut conn, user_id, &event).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        warn!(error = %e, event_type = %event.event_type, "Failed to enqueue webhook event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::webhooks::WebhookCreateDBRequest;
    use crate::test_utils::{create_test_bookmark, create_test_profile};
    use crate::webhooks::signing::generate_secret;

    #[sqlx::test]
    async fn test_enqueue_respects_event_filters(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let bookmark = create_test_bookmark(&pool, owner.id, "https://serde.rs", &["rust"], true).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Webhooks::new(&mut conn);
        for event_types in [None, Some(vec!["bookmark.created".to_string()]), Some(vec!["report.resolved".to_string()])] {
            repo.create(&WebhookCreateDBRequest {
                user_id: owner.id,
                url: "https://hooks.example.com".to_string(),
                secret: generate_secret(),
                event_types,
                description: None,
            })
            .await
            .unwrap();
        }

        let created = enqueue(&mut conn, owner.id, &WebhookEvent::bookmark_created(&bookmark)).await.unwrap();
        assert_eq!(created, 2);

        let created = enqueue(&mut conn, owner.id, &WebhookEvent::bookmark_deleted(&bookmark)).await.unwrap();
        assert_eq!(created, 1);

        let stranger = create_test_profile(&pool).await;
        let created = enqueue(&mut conn, stranger.id, &WebhookEvent::bookmark_created(&bookmark)).await.unwrap();
        assert_eq!(created, 0);
    }
}
