//! Trending topic computation.
//!
//! Tags are compared between the recent window and the window of equal length
//! before it:
//!
//! ```text
//! score = (recent - previous) / sqrt(previous + 1) + 0.1 * recent
//! ```
//!
//! The ranked snapshot replaces `trending_topics` in one transaction. The
//! leader refreshes it every `trending.refresh_interval`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::TrendingConfig;
use crate::db::errors::Result;
use crate::db::handlers::Trending;
use crate::db::models::trending::{TagWindowCounts, TrendingTopicDBResponse};

pub fn score(recent: i64, previous: i64) -> f64 {
    let recent = recent as f64;
    let previous = previous as f64;
    (recent - previous) / (previous + 1.0).sqrt() + recent * 0.1
}

/// Drop rare tags, score and rank the rest. Ranks start at 1.
pub fn rank_topics(counts: Vec<TagWindowCounts>, config: &TrendingConfig, computed_at: DateTime<Utc>) -> Vec<TrendingTopicDBResponse> {
    let mut scored: Vec<(TagWindowCounts, f64)> = counts
        .into_iter()
        .filter(|c| c.recent_count >= config.min_count)
        .map(|c| {
            let s = score(c.recent_count, c.previous_count);
            (c, s)
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.recent_count.cmp(&a.recent_count))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    scored.truncate(config.max_topics);

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (c, score))| TrendingTopicDBResponse {
            tag: c.tag,
            recent_count: c.recent_count,
            previous_count: c.previous_count,
            score,
            rank: i as i32 + 1,
            computed_at,
        })
        .collect()
}

/// Recompute and persist the snapshot. Returns the stored topics.
#[instrument(skip_all, err)]
pub async fn update_trending_topics(pool: &PgPool, config: &TrendingConfig) -> Result<Vec<TrendingTopicDBResponse>> {
    let now = Utc::now();
    let window = chrono::Duration::from_std(config.window).unwrap_or_else(|_| chrono::Duration::hours(24));

    let mut tx = pool.begin().await?;
    let topics = {
        let mut repo = Trending::new(&mut tx);
        let counts = repo.window_counts(now, window).await?;
        let topics = rank_topics(counts, config, now);
        repo.replace(&topics).await?;
        topics
    };
    tx.commit().await?;

    counter!("linkshelf_trending_refreshes_total").increment(1);
    Ok(topics)
}

/// Refresh loop run on the leader until `shutdown` fires.
pub async fn run_refresher(pool: PgPool, config: TrendingConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.refresh_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval = ?config.refresh_interval, "Trending refresher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match update_trending_topics(&pool, &config).await {
                    Ok(topics) => info!(count = topics.len(), "Refreshed trending topics"),
                    Err(e) => warn!(error = %e, "Trending refresh failed"),
                }
            }
        }
    }

    info!("Trending refresher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_bookmark, create_test_profile};

    fn counts(tag: &str, recent: i64, previous: i64) -> TagWindowCounts {
        TagWindowCounts {
            tag: tag.to_string(),
            recent_count: recent,
            previous_count: previous,
        }
    }

    #[test]
    fn test_score() {
        assert!((score(10, 0) - 11.0).abs() < 1e-9);
        // (5 - 3) / 2 + 0.5
        assert!((score(5, 3) - 1.5).abs() < 1e-9);
        assert!(score(3, 15) < 0.0);
    }

    #[test]
    fn test_rank_topics() {
        let config = TrendingConfig {
            min_count: 3,
            max_topics: 2,
            ..Default::default()
        };
        let now = Utc::now();
        let ranked = rank_topics(
            vec![
                counts("steady", 8, 8),
                counts("rare", 2, 0),
                counts("rising", 6, 0),
                counts("beta", 4, 3),
                counts("alpha", 4, 3),
            ],
            &config,
            now,
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].tag, "rising");
        assert_eq!(ranked[0].rank, 1);
        // Equal scores and counts break on the tag name
        assert_eq!(ranked[1].tag, "alpha");
        assert_eq!(ranked[1].rank, 2);
        assert!(ranked.iter().all(|t| t.computed_at == now));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_trending_topics(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        for i in 0..3 {
            create_test_bookmark(&pool, owner.id, &format!("https://rust{i}.example"), &["rust"], true).await;
        }
        create_test_bookmark(&pool, owner.id, "https://go.example", &["go"], true).await;

        let config = TrendingConfig {
            min_count: 2,
            ..Default::default()
        };
        let topics = update_trending_topics(&pool, &config).await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].tag, "rust");
        assert_eq!(topics[0].recent_count, 3);

        let mut conn = pool.acquire().await.unwrap();
        let stored = Trending::new(&mut conn).list(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rank, 1);
    }

    #[sqlx::test]
    async fn test_refresher_stops_on_cancel(pool: PgPool) {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_refresher(pool, TrendingConfig::default(), shutdown.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
