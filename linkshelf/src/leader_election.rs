use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// How often followers retry the lock and the leader checks its connection
pub const LEADER_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task for leader election.
///
/// The leader runs the trending refresher and the webhook dispatcher. Every
/// instance still serves HTTP and streams notifications.
///
/// PostgreSQL advisory locks are session-based, so the leader keeps a dedicated
/// connection for as long as it wants to hold the lock, and unlocks it
/// explicitly on shutdown.
#[instrument(skip(pool, is_leader, on_gain_leadership, on_lose_leadership, shutdown))]
pub async fn leader_election_task<F1, F2, Fut1, Fut2>(
    pool: PgPool,
    is_leader: Arc<AtomicBool>,
    lock_id: i64,
    check_interval: Duration,
    shutdown: CancellationToken,
    on_gain_leadership: F1,
    on_lose_leadership: F2,
) where
    F1: Fn() -> Fut1 + Send + 'static,
    F2: Fn() -> Fut2 + Send + 'static,
    Fut1: Future<Output = anyhow::Result<()>> + Send + 'static,
    Fut2: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut interval = tokio::time::interval(check_interval);
    let mut leader_conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if !is_leader.load(Ordering::Relaxed) {
            let mut conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("Failed to acquire connection for leader election: {}", e);
                    continue;
                }
            };

            match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                .bind(lock_id)
                .fetch_one(&mut *conn)
                .await
            {
                Ok(true) => {
                    info!("Gained leadership");
                    is_leader.store(true, Ordering::Relaxed);
                    leader_conn = Some(conn);

                    if let Err(e) = on_gain_leadership().await {
                        tracing::error!("Failed to execute on_gain_leadership callback: {}", e);
                    }
                }
                Ok(false) => debug!("Following - will retry"),
                Err(e) => tracing::error!("Failed to check leader lock: {}", e),
            }
        } else if let Some(ref mut conn) = leader_conn {
            if let Err(e) = sqlx::query("SELECT 1").execute(&mut **conn).await {
                // A dead session has already released the advisory lock
                tracing::warn!("Lost leadership (connection died): {}", e);
                is_leader.store(false, Ordering::Relaxed);
                leader_conn = None;

                if let Err(e) = on_lose_leadership().await {
                    tracing::error!("Failed to execute on_lose_leadership callback: {}", e);
                }
            } else {
                debug!("Leadership renewed (connection alive)");
            }
        } else {
            tracing::error!("Inconsistent state: is_leader=true but no connection");
            is_leader.store(false, Ordering::Relaxed);
        }
    }

    if is_leader.swap(false, Ordering::Relaxed) {
        // The connection goes back to the pool, so the session lock must be released explicitly
        if let Some(mut conn) = leader_conn.take()
            && let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)").bind(lock_id).execute(&mut *conn).await
        {
            tracing::warn!("Failed to release leader lock: {}", e);
        }
        if let Err(e) = on_lose_leadership().await {
            tracing::error!("Failed to execute on_lose_leadership callback: {}", e);
        }
        info!("Released leadership on shutdown");
    }
}
