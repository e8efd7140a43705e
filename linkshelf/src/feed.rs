//! Personalized feed ranking.
//!
//! Candidates come from [`Bookmarks::feed_candidates`]; this module scores,
//! orders, de-duplicates and paginates them. Scoring is a pure function of the
//! candidate, the caller's interest tags and [`FeedConfig`]:
//!
//! ```text
//! score = (follow_weight * followed
//!          + tag_weight * tag_overlap
//!          + popularity_weight * ln(1 + popularity)
//!          + base_score) / (age_hours + 2) ^ gravity
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::config::FeedConfig;
use crate::db::errors::Result;
use crate::db::handlers::Bookmarks;
use crate::db::models::bookmarks::FeedCandidate;
use crate::types::{UserId, abbrev_uuid};

/// A candidate with its computed score
#[derive(Debug, Clone)]
pub struct RankedBookmark {
    pub candidate: FeedCandidate,
    pub score: f64,
    pub tag_overlap: usize,
}

/// One ranked page plus the number of ranked entries overall
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<RankedBookmark>,
    pub total_count: usize,
}

pub fn score(candidate: &FeedCandidate, tag_overlap: usize, now: DateTime<Utc>, config: &FeedConfig) -> f64 {
    let age_hours = ((now - candidate.created_at).num_seconds().max(0) as f64) / 3600.0;
    let followed = if candidate.followed { 1.0 } else { 0.0 };
    let popularity = candidate.popularity.max(0) as f64;

    let numerator = config.follow_weight * followed
        + config.tag_weight * tag_overlap as f64
        + config.popularity_weight * popularity.ln_1p()
        + config.base_score;

    numerator / (age_hours + 2.0).powf(config.gravity)
}

/// Score, order and de-duplicate candidates. Ties break on newer first, then id.
pub fn rank(candidates: Vec<FeedCandidate>, interests: &[String], now: DateTime<Utc>, config: &FeedConfig) -> Vec<RankedBookmark> {
    let interests: HashSet<&str> = interests.iter().map(String::as_str).collect();

    let mut ranked: Vec<RankedBookmark> = candidates
        .into_iter()
        .map(|candidate| {
            let tag_overlap = candidate.tags.iter().filter(|t| interests.contains(t.as_str())).count();
            let score = score(&candidate, tag_overlap, now, config);
            RankedBookmark {
                candidate,
                score,
                tag_overlap,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });

    // Keep the best-ranked copy of each URL
    let mut seen = HashSet::new();
    ranked.retain(|r| seen.insert(r.candidate.url.clone()));
    ranked
}

/// Build one page of the caller's feed.
#[instrument(skip(conn, config), fields(caller = %abbrev_uuid(&caller)), err)]
pub async fn generate_feed(conn: &mut PgConnection, caller: UserId, config: &FeedConfig, skip: i64, limit: i64) -> Result<FeedPage> {
    let now = Utc::now();
    let since = now - chrono::Duration::from_std(config.window).unwrap_or_else(|_| chrono::Duration::days(14));

    let mut repo = Bookmarks::new(conn);
    let interests = repo.top_tags(caller, config.interest_tags).await?;
    let candidates = repo.feed_candidates(caller, since, config.max_candidates).await?;

    let ranked = rank(candidates, &interests, now, config);
    let total_count = ranked.len();
    let items = ranked.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect();

    Ok(FeedPage { items, total_count })
}
