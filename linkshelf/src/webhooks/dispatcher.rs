//! Webhook dispatch: claim, sign, send, process results.
//!
//! ```text
//! dispatcher.tick()
//!   ├─ claim_and_send()
//!   │    ├─ DB: claim_due_deliveries()       // FOR UPDATE SKIP LOCKED, lease bumped 5 min
//!   │    │                                   // + LEFT JOIN webhook (url, secret, enabled)
//!   │    └─ for each claimed delivery:
//!   │         ├─ DB: mark_exhausted()        // webhook gone or disabled
//!   │         ├─ CPU: sign_payload()
//!   │         └─ send_tx.try_send(request) ─────────────┐
//!   │                                                    ▼
//!   │                                    run_sender (spawned task)
//!   │                                      semaphore-capped HTTP POSTs
//!   │                                    result_tx.send(result) ──┐
//!   └─ drain_results()                                           │
//!        ├─ result_rx.try_recv() ◄───────────────────────────────┘
//!        ├─ Success → mark_delivered() + reset_failures()
//!        └─ Failure → mark_failed() + increment_failures()
//! ```
//!
//! The sender task holds no database handle and no secrets. Deliveries lost
//! on shutdown become claimable again once their lease expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::db::handlers::Webhooks;
use crate::types::abbrev_uuid;
use crate::webhooks::signing;

#[derive(Debug)]
struct WebhookSendRequest {
    url: String,
    headers: Vec<(String, String)>,
    body: String,
    delivery_id: Uuid,
    webhook_id: Uuid,
    attempt_count: i32,
}

#[derive(Debug)]
enum SendOutcome {
    Success { status_code: u16 },
    Failure { status_code: Option<u16>, error: String },
}

#[derive(Debug)]
struct WebhookSendResult {
    delivery_id: Uuid,
    webhook_id: Uuid,
    attempt_count: i32,
    outcome: SendOutcome,
}

/// Counters for one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DispatchSummary {
    /// Deliveries claimed from the queue
    pub claimed: usize,
    /// Claimed deliveries handed to the sender
    pub sent: usize,
    /// Claimed deliveries dropped because the webhook is gone or disabled
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Webhooks disabled by the circuit breaker during this cycle
    pub webhooks_disabled: usize,
}

pub struct WebhookDispatcher {
    pool: PgPool,
    send_tx: mpsc::Sender<WebhookSendRequest>,
    result_rx: mpsc::Receiver<WebhookSendResult>,
    retry_schedule: Vec<i64>,
    claim_batch_size: i64,
    circuit_breaker_threshold: i32,
    timeout: Duration,
}

impl WebhookDispatcher {
    /// Create a dispatcher and spawn its sender task.
    pub fn spawn(pool: PgPool, config: &WebhookConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let (send_tx, send_rx) = mpsc::channel::<WebhookSendRequest>(config.channel_capacity);
        let (result_tx, result_rx) = mpsc::channel(config.channel_capacity);

        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        tokio::spawn(run_sender(send_rx, result_tx, http_client, config.max_concurrent_sends, shutdown));

        Ok(Self {
            pool,
            send_tx,
            result_rx,
            retry_schedule: config.retry_schedule_secs.clone(),
            claim_batch_size: config.claim_batch_size,
            circuit_breaker_threshold: config.circuit_breaker_threshold,
            timeout,
        })
    }

    /// One periodic cycle: claim and send due deliveries, then record whatever
    /// results have already come back.
    pub async fn tick(&mut self) -> DispatchSummary {
        tracing::debug!("Webhook dispatcher tick");
        let mut summary = self.claim_and_send().await;
        self.drain_results(&mut summary, 0).await;
        summary
    }

    /// Claim, send and wait until every sent delivery has a recorded result
    /// (bounded by the HTTP timeout). Used by the admin trigger.
    pub async fn process_pending(&mut self) -> DispatchSummary {
        let mut summary = self.claim_and_send().await;
        let expected = summary.sent;
        self.drain_results(&mut summary, expected).await;
        summary
    }

    async fn claim_and_send(&self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let mut conn = match self.pool.acquire().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to acquire connection for delivery claims");
                return summary;
            }
        };

        let deliveries = match Webhooks::new(&mut conn).claim_due_deliveries(self.claim_batch_size).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to claim due deliveries");
                return summary;
            }
        };

        summary.claimed = deliveries.len();
        if deliveries.is_empty() {
            tracing::debug!("No deliveries to claim");
            return summary;
        }

        counter!("linkshelf_webhook_deliveries_claimed_total").increment(deliveries.len() as u64);
        tracing::debug!(count = deliveries.len(), "Claimed deliveries for sending");

        for delivery in deliveries {
            let (Some(url), Some(secret), Some(true)) = (&delivery.url, &delivery.secret, delivery.enabled) else {
                tracing::debug!(
                    delivery_id = %abbrev_uuid(&delivery.id),
                    webhook_id = %abbrev_uuid(&delivery.webhook_id),
                    "Webhook missing or disabled, marking delivery exhausted"
                );
                if let Err(e) = Webhooks::new(&mut conn).mark_exhausted(delivery.id, "webhook disabled").await {
                    tracing::warn!(error = %e, "Failed to mark delivery exhausted");
                }
                summary.skipped += 1;
                continue;
            };

            let body = match serde_json::to_string(&delivery.payload) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, delivery_id = %delivery.id, "Unserializable payload, marking exhausted");
                    if let Err(e) = Webhooks::new(&mut conn).mark_exhausted(delivery.id, "invalid payload").await {
                        tracing::warn!(error = %e, delivery_id = %delivery.id, "Failed to mark delivery exhausted");
                    }
                    summary.skipped += 1;
                    continue;
                }
            };

            let timestamp = Utc::now().timestamp();
            let msg_id = delivery.event_id.to_string();
            let Some(signature) = signing::sign_payload(&msg_id, timestamp, &body, secret) else {
                tracing::warn!(delivery_id = %delivery.id, "Webhook secret is malformed, marking exhausted");
                if let Err(e) = Webhooks::new(&mut conn).mark_exhausted(delivery.id, "malformed secret").await {
                    tracing::warn!(error = %e, delivery_id = %delivery.id, "Failed to mark delivery exhausted");
                }
                summary.skipped += 1;
                continue;
            };

            let request = WebhookSendRequest {
                url: url.clone(),
                headers: signing::delivery_headers(&msg_id, timestamp, signature),
                body,
                delivery_id: delivery.id,
                webhook_id: delivery.webhook_id,
                attempt_count: delivery.attempt_count,
            };

            match self.send_tx.try_send(request) {
                Ok(()) => summary.sent += 1,
                // The claim lease brings it back later
                Err(e) => tracing::warn!(delivery_id = %delivery.id, "Sender channel full, retrying after lease: {}", e),
            }
        }

        summary
    }

    /// Record send results. Waits for at least `wait_for` results (or the
    /// HTTP timeout), then takes whatever else is ready.
    async fn drain_results(&mut self, summary: &mut DispatchSummary, wait_for: usize) {
        let mut conn = match self.pool.acquire().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to acquire connection for result drain");
                return;
            }
        };

        let deadline = tokio::time::Instant::now() + self.timeout + Duration::from_secs(1);
        let mut drained = 0usize;

        loop {
            let result = if drained < wait_for {
                match tokio::time::timeout_at(deadline, self.result_rx.recv()).await {
                    Ok(Some(result)) => result,
                    _ => break,
                }
            } else {
                match self.result_rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => break,
                }
            };
            drained += 1;

            let mut repo = Webhooks::new(&mut conn);
            // Rows deleted while in flight make these updates no-ops
            match result.outcome {
                SendOutcome::Success { status_code } => {
                    summary.succeeded += 1;
                    counter!("linkshelf_webhook_deliveries_total", "outcome" => "success").increment(1);
                    if let Err(e) = repo.mark_delivered(result.delivery_id, status_code as i32).await {
                        tracing::warn!(error = %e, delivery_id = %result.delivery_id, "Failed to mark delivery as delivered");
                    }
                    if let Err(e) = repo.reset_failures(result.webhook_id).await {
                        tracing::warn!(error = %e, webhook_id = %result.webhook_id, "Failed to reset webhook failures");
                    }
                    tracing::debug!(
                        webhook_id = %abbrev_uuid(&result.webhook_id),
                        delivery_id = %abbrev_uuid(&result.delivery_id),
                        status = status_code,
                        "Webhook delivered"
                    );
                }
                SendOutcome::Failure { status_code, ref error } => {
                    summary.failed += 1;
                    counter!("linkshelf_webhook_deliveries_total", "outcome" => "failure").increment(1);
                    if let Err(e) = repo
                        .mark_failed(
                            result.delivery_id,
                            status_code.map(|c| c as i32),
                            error,
                            result.attempt_count,
                            &self.retry_schedule,
                        )
                        .await
                    {
                        tracing::warn!(error = %e, delivery_id = %result.delivery_id, "Failed to mark delivery as failed");
                    }
                    match repo.increment_failures(result.webhook_id, self.circuit_breaker_threshold).await {
                        Ok(Some(webhook)) => {
                            summary.webhooks_disabled += 1;
                            tracing::warn!(
                                webhook_id = %webhook.id,
                                failures = webhook.consecutive_failures,
                                "Webhook disabled after repeated failures"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, webhook_id = %result.webhook_id, "Failed to increment webhook failures"),
                    }
                    tracing::warn!(
                        webhook_id = %abbrev_uuid(&result.webhook_id),
                        delivery_id = %abbrev_uuid(&result.delivery_id),
                        status_code = ?status_code,
                        error = %error,
                        "Webhook delivery failed"
                    );
                }
            }
        }

        if drained > 0 {
            tracing::debug!(count = drained, "Drained webhook send results");
        }
    }
}

/// Slot holding the leader's dispatcher. Empty on followers.
pub type DispatcherSlot = Arc<Mutex<Option<WebhookDispatcher>>>;

/// Tick the dispatcher in `slot` every `poll_interval` until cancelled.
/// The lock is held only for one cycle so the admin trigger can interleave.
/// The first cycle runs one interval after start.
pub async fn run_dispatcher(slot: DispatcherSlot, poll_interval: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + poll_interval, poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval = ?poll_interval, "Webhook dispatcher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let mut guard = slot.lock().await;
                let Some(dispatcher) = guard.as_mut() else {
                    tracing::debug!("Webhook dispatcher slot empty, stopping");
                    break;
                };
                let summary = dispatcher.tick().await;
                if summary.claimed > 0 {
                    tracing::debug!(?summary, "Webhook dispatch cycle");
                }
            }
        }
    }

    tracing::info!("Webhook dispatcher stopped");
}

/// Long-lived task performing HTTP delivery of signed requests.
async fn run_sender(
    mut rx: mpsc::Receiver<WebhookSendRequest>,
    result_tx: mpsc::Sender<WebhookSendResult>,
    http_client: reqwest::Client,
    max_concurrent_sends: usize,
    shutdown: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_sends));

    loop {
        let request = tokio::select! {
            req = rx.recv() => match req {
                Some(r) => r,
                None => {
                    tracing::debug!("Webhook sender channel closed, shutting down");
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                tracing::debug!("Webhook sender received shutdown signal");
                break;
            }
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            tracing::warn!("Webhook sender semaphore closed");
            break;
        };

        let client = http_client.clone();
        let tx = result_tx.clone();

        tokio::spawn(async move {
            let _permit = permit;

            let mut builder = client.post(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let outcome = match builder.body(request.body).send().await {
                Ok(response) if response.status().is_success() => SendOutcome::Success {
                    status_code: response.status().as_u16(),
                },
                Ok(response) => {
                    let status_code = response.status().as_u16();
                    SendOutcome::Failure {
                        status_code: Some(status_code),
                        error: format!("HTTP {status_code}"),
                    }
                }
                Err(e) => SendOutcome::Failure {
                    status_code: None,
                    error: e.to_string(),
                },
            };

            let result = WebhookSendResult {
                delivery_id: request.delivery_id,
                webhook_id: request.webhook_id,
                attempt_count: request.attempt_count,
                outcome,
            };

            if let Err(e) = tx.send(result).await {
                tracing::warn!(delivery_id = %request.delivery_id, "Failed to return webhook result: {}", e);
            }
        });
    }

    tracing::debug!("Webhook sender task exited");
}
