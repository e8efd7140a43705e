//! Realtime notification fan-out.
//!
//! Every inserted notification is published on [`NOTIFICATION_CHANNEL`] by the
//! insert statement itself. Each instance runs one [`run_listener`] task that
//! `LISTEN`s on that channel and re-broadcasts payloads through a
//! [`NotificationHub`]; SSE subscribers filter the broadcast by recipient.
//! This keeps one database connection per instance regardless of the number
//! of open streams, and works across replicas.

use std::time::Duration;

use sqlx::{PgPool, postgres::PgListener};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::handlers::Notifications;
use crate::db::handlers::notifications::NOTIFICATION_CHANNEL;
use crate::db::models::notifications::{NotificationCreateDBRequest, NotificationDBResponse};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// In-process broadcast of committed notifications.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<NotificationDBResponse>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationDBResponse> {
        self.sender.subscribe()
    }

    /// Forward a payload received from Postgres. Returns the number of live
    /// subscribers it reached.
    fn publish(&self, notification: NotificationDBResponse) -> usize {
        // No receivers is not an error: nobody has a stream open
        self.sender.send(notification).unwrap_or(0)
    }
}

/// Listen for notification payloads until `shutdown` fires, reconnecting
/// after connection loss.
pub async fn run_listener(pool: PgPool, hub: NotificationHub, shutdown: CancellationToken) {
    'outer: loop {
        let mut listener = match connect(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Failed to start notification listener, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    _ = shutdown.cancelled() => break,
                }
            }
        };
        info!("Listening for notifications on {}", NOTIFICATION_CHANNEL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break 'outer,
                received = listener.try_recv() => match received {
                    Ok(Some(notification)) => {
                        match serde_json::from_str::<NotificationDBResponse>(notification.payload()) {
                            Ok(payload) => {
                                let reached = hub.publish(payload);
                                debug!(subscribers = reached, "Forwarded notification");
                            }
                            Err(e) => warn!(error = %e, "Discarding malformed notification payload"),
                        }
                    }
                    Ok(None) => {
                        info!("Notification listener connection lost, reconnecting");
                        continue 'outer;
                    }
                    Err(e) => {
                        error!(error = %e, "Notification listener error, reconnecting");
                        tokio::select! {
                            _ = tokio::time::sleep(RECONNECT_DELAY) => continue 'outer,
                            _ = shutdown.cancelled() => break 'outer,
                        }
                    }
                }
            }
        }
    }

    info!("Notification listener stopped");
}

async fn connect(pool: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(NOTIFICATION_CHANNEL).await?;
    Ok(listener)
}

/// Store a notification, logging rather than failing the caller's request.
pub async fn notify(pool: &PgPool, request: NotificationCreateDBRequest) {
    let result = match pool.acquire().await {
        Ok(mut conn) => Notifications::new(&mut conn).create(&request).await.map(|_| ()),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        warn!(error = %e, kind = ?request.kind, "Failed to store notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::notifications::NotificationKind;
    use crate::test_utils::create_test_profile;

    #[sqlx::test]
    #[test_log::test]
    async fn test_listener_forwards_inserted_notifications(pool: PgPool) {
        let recipient = create_test_profile(&pool).await;
        let hub = NotificationHub::new(16);
        let mut rx = hub.subscribe();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_listener(pool.clone(), hub.clone(), shutdown.clone()));

        // Give the listener time to issue LISTEN
        tokio::time::sleep(Duration::from_millis(300)).await;

        notify(
            &pool,
            NotificationCreateDBRequest {
                recipient_id: recipient.id,
                kind: NotificationKind::System,
                actor_id: None,
                subject_id: None,
                message: "Welcome to the shelf".to_string(),
            },
        )
        .await;

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification should arrive")
            .unwrap();
        assert_eq!(received.recipient_id, recipient.id);
        assert_eq!(received.kind, NotificationKind::System);
        assert_eq!(received.message, "Welcome to the shelf");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = NotificationHub::new(4);
        let notification = NotificationDBResponse {
            id: uuid::Uuid::new_v4(),
            recipient_id: uuid::Uuid::new_v4(),
            kind: NotificationKind::System,
            actor_id: None,
            subject_id: None,
            message: "hi".to_string(),
            read_at: None,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(hub.publish(notification), 0);
    }
}
