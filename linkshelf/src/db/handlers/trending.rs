//! Database repository for trending topic snapshots.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, QueryBuilder};
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::trending::{TagWindowCounts, TrendingTopicDBResponse},
};

/// Advisory lock serializing snapshot rewrites ("TRENDING" in ASCII)
const SNAPSHOT_LOCK_ID: i64 = 0x5452_454E_4449_4E47;

pub struct Trending<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Trending<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Tag uses on public, visible bookmarks in `[now - window, now)` and the
    /// window of equal length before it. Tags unused in both windows are absent.
    #[instrument(skip(self), err)]
    pub async fn window_counts(&mut self, now: DateTime<Utc>, window: chrono::Duration) -> Result<Vec<TagWindowCounts>> {
        let recent_start = now - window;
        let previous_start = recent_start - window;

        let counts = sqlx::query_as::<_, TagWindowCounts>(
            r#"
            SELECT
                tag,
                COUNT(*) FILTER (WHERE b.created_at >= $2) AS recent_count,
                COUNT(*) FILTER (WHERE b.created_at < $2) AS previous_count
            FROM bookmarks b
            JOIN profiles p ON p.id = b.owner_id
            CROSS JOIN LATERAL unnest(b.tags) AS tag
            WHERE b.is_public AND NOT b.is_hidden AND NOT p.is_suspended
              AND b.created_at >= $1 AND b.created_at < $3
            GROUP BY tag
            "#,
        )
        .bind(previous_start)
        .bind(recent_start)
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(counts)
    }

    /// Replace the whole snapshot. Run inside a transaction so readers never
    /// see an empty table; concurrent replacements wait for each other on a
    /// transaction-scoped advisory lock.
    #[instrument(skip(self, topics), fields(count = topics.len()), err)]
    pub async fn replace(&mut self, topics: &[TrendingTopicDBResponse]) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SNAPSHOT_LOCK_ID)
            .execute(&mut *self.db)
            .await?;
        sqlx::query("DELETE FROM trending_topics").execute(&mut *self.db).await?;

        if topics.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::new("INSERT INTO trending_topics (tag, recent_count, previous_count, score, rank, computed_at) ");
        query.push_values(topics, |mut row, topic| {
            row.push_bind(&topic.tag)
                .push_bind(topic.recent_count)
                .push_bind(topic.previous_count)
                .push_bind(topic.score)
                .push_bind(topic.rank)
                .push_bind(topic.computed_at);
        });
        query.build().execute(&mut *self.db).await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn list(&mut self, limit: i64) -> Result<Vec<TrendingTopicDBResponse>> {
        let topics = sqlx::query_as::<_, TrendingTopicDBResponse>("SELECT * FROM trending_topics ORDER BY rank LIMIT $1")
            .bind(limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_bookmark, create_test_profile};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_window_counts(pool: PgPool) {
        let owner = create_test_profile(&pool).await;
        let old = create_test_bookmark(&pool, owner.id, "https://old.example", &["rust"], true).await;
        create_test_bookmark(&pool, owner.id, "https://new.example", &["rust", "wasm"], true).await;
        create_test_bookmark(&pool, owner.id, "https://private.example", &["secret"], false).await;
        sqlx::query("UPDATE bookmarks SET created_at = NOW() - INTERVAL '30 hours' WHERE id = $1")
            .bind(old.id)
            .execute(&pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let mut counts = Trending::new(&mut conn)
            .window_counts(Utc::now(), chrono::Duration::hours(24))
            .await
            .unwrap();
        counts.sort_by(|a, b| a.tag.cmp(&b.tag));

        assert_eq!(
            counts,
            vec![
                TagWindowCounts {
                    tag: "rust".to_string(),
                    recent_count: 1,
                    previous_count: 1
                },
                TagWindowCounts {
                    tag: "wasm".to_string(),
                    recent_count: 1,
                    previous_count: 0
                },
            ]
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_replace_snapshot(pool: PgPool) {
        let topic = |tag: &str, rank: i32| TrendingTopicDBResponse {
            tag: tag.to_string(),
            recent_count: 5,
            previous_count: 1,
            score: 2.5,
            rank,
            computed_at: Utc::now(),
        };

        let mut tx = pool.begin().await.unwrap();
        Trending::new(&mut tx).replace(&[topic("a", 1), topic("b", 2)]).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        Trending::new(&mut tx).replace(&[topic("c", 1)]).await.unwrap();
        tx.commit().await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let topics = Trending::new(&mut conn).list(10).await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].tag, "c");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_overlapping_replacements_serialize(pool: PgPool) {
        let topic = |tag: &str, score: f64| TrendingTopicDBResponse {
            tag: tag.to_string(),
            recent_count: 4,
            previous_count: 0,
            score,
            rank: 1,
            computed_at: Utc::now(),
        };

        let mut first = pool.begin().await.unwrap();
        Trending::new(&mut first).replace(&[topic("rust", 1.0)]).await.unwrap();

        let second = tokio::spawn({
            let pool = pool.clone();
            async move {
                let mut tx = pool.begin().await.unwrap();
                Trending::new(&mut tx).replace(&[topic("rust", 2.0)]).await?;
                tx.commit().await.unwrap();
                Ok::<_, crate::db::errors::DbError>(())
            }
        });

        // Let the second rewrite reach the lock before the first commits
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!second.is_finished());
        first.commit().await.unwrap();

        second.await.unwrap().unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let topics = Trending::new(&mut conn).list(10).await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].score, 2.0);
    }
}
